use std::rc::Rc;

use colored::Colorize;
use itertools::Itertools;

use crate::frontend::ast::{Node, NodeKind};

/// Traversal state for the non-recursive tree walk
struct StackItem {
    node: Rc<Node>,
    prefix: String,
    is_last: bool,
}

/// Prints an ASCII tree rendering of the program tree to stdout.
pub fn pretty_print_ast(root: &Rc<Node>) {
    let mut stack = vec![StackItem {
        node: Rc::clone(root),
        prefix: String::new(),
        is_last: true,
    }];

    while let Some(item) = stack.pop() {
        println!(
            "{}{} {}",
            item.prefix,
            if item.is_last { "└──" } else { "├──" },
            caption(&item.node)
        );

        let child_prefix = format!(
            "{}{}",
            item.prefix,
            if item.is_last { "    " } else { "│   " }
        );

        let mut first = true;

        for child in children_of(&item.node).into_iter().rev() {
            stack.push(StackItem {
                node: child,
                prefix: child_prefix.clone(),
                is_last: first,
            });
            first = false;
        }
    }
}

fn caption(node: &Node) -> String {
    match &node.kind {
        NodeKind::Number(value) => format!("{} {}", "Number:".cyan(), value.purple()),
        NodeKind::Identifier(name) => format!("{} {}", "Identifier:".cyan(), name.blue()),
        NodeKind::StringLiteral(value) => {
            format!("{} {}", "StringLiteral:".cyan(), format!("{value:?}").purple())
        }
        NodeKind::Binary { operator, .. } => {
            format!("{} ({})", "BinaryOp".cyan(), operator.to_string().white())
        }
        NodeKind::Sequence { .. } => "Sequence".cyan().to_string(),
        NodeKind::Condition { operator, .. } => {
            format!("{} ({})", "Condition".cyan(), operator.to_string().white())
        }
        NodeKind::If { .. } => "If".cyan().to_string(),
        NodeKind::While { .. } => "While".cyan().to_string(),
        NodeKind::Print { kind, .. } => format!("{}({kind})", "Print".cyan()),
        NodeKind::Assignment { name, .. } => {
            format!("{} {}", "Assignment:".cyan(), name.blue())
        }
        NodeKind::Declaration { ty, names, .. } => format!(
            "{} ({ty}): {}",
            "Declaration".cyan(),
            names.iter().join(", ").blue()
        ),
    }
}

fn children_of(node: &Node) -> Vec<Rc<Node>> {
    match &node.kind {
        NodeKind::Number(_) | NodeKind::Identifier(_) | NodeKind::StringLiteral(_) => Vec::new(),
        NodeKind::Binary { lhs, rhs, .. } | NodeKind::Condition { lhs, rhs, .. } => {
            vec![Rc::clone(lhs), Rc::clone(rhs)]
        }
        NodeKind::Sequence { first, second } => first
            .iter()
            .chain(second.iter())
            .map(Rc::clone)
            .collect(),
        NodeKind::If {
            condition,
            then_body,
            else_body,
        } => {
            let mut children = vec![Rc::clone(condition), Rc::clone(then_body)];
            if let Some(else_body) = else_body {
                children.push(Rc::clone(else_body));
            }
            children
        }
        NodeKind::While { condition, body } => vec![Rc::clone(condition), Rc::clone(body)],
        NodeKind::Print { payload, .. } => vec![Rc::clone(payload)],
        NodeKind::Assignment { value, .. } => vec![Rc::clone(value)],
        NodeKind::Declaration { initializer, .. } => {
            initializer.iter().map(Rc::clone).collect()
        }
    }
}
