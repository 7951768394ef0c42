use std::{collections::BTreeMap, rc::Rc};

use thiserror::Error;

use crate::{
    frontend::{
        ast::{Node, NodeKind, PrintKind, VarType},
        lexer::Span,
    },
    middle::ir::{GeneratedIr, Instruction, IrHandle, pool::IrPool},
};

/// Structural errors are unrecoverable: lowering aborts and no partial IR
/// is handed to the backend.
#[derive(Debug, Error)]
pub enum LoweringError {
    #[error("an initializer is only allowed when declaring a single variable")]
    MultiDeclarationInitializer { span: Span },
    #[error("expected a comparison condition")]
    MalformedCondition { span: Span },
    #[error("expected a value expression")]
    NonValueExpression { span: Span },
}

impl LoweringError {
    /// Source location of the offending node
    pub fn span(&self) -> Span {
        match self {
            Self::MultiDeclarationInitializer { span }
            | Self::MalformedCondition { span }
            | Self::NonValueExpression { span } => *span,
        }
    }
}

/// Walks the program tree and emits the flat instruction sequence along
/// with the identifier and constant tables. One context per compilation
/// unit: the temporary/label/string counters and both tables are instance
/// state, so independent compilations never interfere.
pub struct LoweringContext {
    pool: IrPool,
    code: Vec<IrHandle>,
    identifiers: BTreeMap<String, VarType>,
    constants: BTreeMap<String, Vec<u8>>,
    next_temporary: u32,
    next_label: u32,
    next_string: u32,
}

impl LoweringContext {
    pub fn lower(root: &Rc<Node>) -> Result<GeneratedIr, LoweringError> {
        let mut context = Self {
            pool: IrPool::new(),
            code: Vec::new(),
            identifiers: BTreeMap::new(),
            constants: BTreeMap::new(),
            next_temporary: 1,
            next_label: 1,
            next_string: 1,
        };

        context.lower_statement(root)?;

        Ok(context.into_output())
    }

    fn into_output(self) -> GeneratedIr {
        GeneratedIr {
            pool: self.pool,
            code: self.code,
            identifiers: self.identifiers,
            constants: self.constants,
        }
    }

    fn create_temporary(&mut self) -> String {
        let name = format!("T{}", self.next_temporary);
        self.next_temporary += 1;
        name
    }

    fn create_label(&mut self) -> String {
        let name = format!("L{}", self.next_label);
        self.next_label += 1;
        name
    }

    fn create_string_symbol(&mut self) -> String {
        let name = format!("S{}", self.next_string);
        self.next_string += 1;
        name
    }

    fn emit(&mut self, instruction: Instruction) {
        let handle = self.pool.acquire(instruction);
        self.code.push(handle);
    }

    /// Lowers an expression to the name its value lives under, emitting
    /// instructions for any intermediate results.
    fn lower_expression(&mut self, node: &Node) -> Result<String, LoweringError> {
        match &node.kind {
            NodeKind::Number(value) => Ok(value.clone()),
            NodeKind::Identifier(name) => Ok(name.clone()),
            NodeKind::StringLiteral(value) => {
                let symbol = self.create_string_symbol();
                self.constants
                    .insert(symbol.clone(), value.clone().into_bytes());

                Ok(symbol)
            }
            NodeKind::Binary { lhs, operator, rhs } => {
                let left = self.lower_expression(lhs)?;
                let right = self.lower_expression(rhs)?;

                let temporary = self.create_temporary();
                self.identifiers.insert(temporary.clone(), VarType::Int);

                self.emit(Instruction::Assign {
                    var: temporary.clone(),
                    left,
                    operator: Some(operator.to_string()),
                    right: Some(right),
                });

                Ok(temporary)
            }
            _ => Err(LoweringError::NonValueExpression { span: node.span }),
        }
    }

    fn lower_statement(&mut self, node: &Node) -> Result<(), LoweringError> {
        match &node.kind {
            NodeKind::Sequence { first, second } => {
                if let Some(first) = first {
                    self.lower_statement(first)?;
                }
                if let Some(second) = second {
                    self.lower_statement(second)?;
                }

                Ok(())
            }
            NodeKind::Assignment { name, value } => self.lower_assignment(name, value),
            NodeKind::Declaration {
                ty,
                names,
                initializer,
            } => self.lower_declaration(node.span, *ty, names, initializer.as_deref()),
            NodeKind::If {
                condition,
                then_body,
                else_body,
            } => self.lower_if(condition, then_body, else_body.as_deref()),
            NodeKind::While { condition, body } => self.lower_while(condition, body),
            NodeKind::Print { kind, payload } => self.lower_print(*kind, payload),

            // Bare expressions in statement position produce no code
            NodeKind::Number(_)
            | NodeKind::Identifier(_)
            | NodeKind::StringLiteral(_)
            | NodeKind::Binary { .. }
            | NodeKind::Condition { .. } => Ok(()),
        }
    }

    fn lower_assignment(&mut self, name: &str, value: &Node) -> Result<(), LoweringError> {
        // A name first seen on the left of an assignment is registered as a
        // string
        if !self.identifiers.contains_key(name) {
            self.identifiers.insert(name.to_owned(), VarType::Str);
        }

        let right = self.lower_expression(value)?;

        self.emit(Instruction::Assign {
            var: name.to_owned(),
            left: right,
            operator: None,
            right: None,
        });

        Ok(())
    }

    fn lower_declaration(
        &mut self,
        span: Span,
        ty: VarType,
        names: &[String],
        initializer: Option<&Node>,
    ) -> Result<(), LoweringError> {
        for name in names {
            self.identifiers.insert(name.clone(), ty);
        }

        if let Some(initializer) = initializer {
            if names.len() != 1 {
                return Err(LoweringError::MultiDeclarationInitializer { span });
            }

            let right = self.lower_expression(initializer)?;

            self.emit(Instruction::Assign {
                var: names[0].clone(),
                left: right,
                operator: None,
                right: None,
            });
        }

        Ok(())
    }

    /// Lowers a condition node to a single compare-and-branch and returns
    /// the label taken when the comparison holds.
    fn lower_condition(&mut self, node: &Node) -> Result<String, LoweringError> {
        let NodeKind::Condition { lhs, operator, rhs } = &node.kind else {
            return Err(LoweringError::MalformedCondition { span: node.span });
        };

        let left = self.lower_expression(lhs)?;
        let right = self.lower_expression(rhs)?;

        let true_label = self.create_label();

        self.emit(Instruction::Compare {
            left,
            operator: operator.to_string(),
            right,
            target: true_label.clone(),
        });

        Ok(true_label)
    }

    fn lower_if(
        &mut self,
        condition: &Node,
        then_body: &Node,
        else_body: Option<&Node>,
    ) -> Result<(), LoweringError> {
        let then_label = self.lower_condition(condition)?;
        let else_label = self.create_label();
        let end_label = self.create_label();

        // The compare only encodes its true target; the false path is this
        // explicit jump
        self.emit(Instruction::Jump {
            target: else_label.clone(),
        });

        self.emit(Instruction::Label { name: then_label });
        self.lower_statement(then_body)?;
        self.emit(Instruction::Jump {
            target: end_label.clone(),
        });

        self.emit(Instruction::Label { name: else_label });
        if let Some(else_body) = else_body {
            self.lower_statement(else_body)?;
        }

        self.emit(Instruction::Label { name: end_label });

        Ok(())
    }

    fn lower_while(&mut self, condition: &Node, body: &Node) -> Result<(), LoweringError> {
        let start_label = self.create_label();

        // The condition is re-evaluated on every iteration
        self.emit(Instruction::Label {
            name: start_label.clone(),
        });

        let true_label = self.lower_condition(condition)?;
        let end_label = self.create_label();

        self.emit(Instruction::Jump {
            target: end_label.clone(),
        });

        self.emit(Instruction::Label { name: true_label });
        self.lower_statement(body)?;
        self.emit(Instruction::Jump {
            target: start_label,
        });

        self.emit(Instruction::Label { name: end_label });

        Ok(())
    }

    fn lower_print(&mut self, kind: PrintKind, payload: &Node) -> Result<(), LoweringError> {
        // A string literal payload lowers to a fresh constant symbol, so
        // both print forms reduce to a name
        let value = self.lower_expression(payload)?;

        self.emit(Instruction::Print { kind, value });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{SourceFile, SourceFileOrigin, parser::Parser};

    fn lower_source(contents: &str) -> GeneratedIr {
        try_lower_source(contents).unwrap()
    }

    fn try_lower_source(contents: &str) -> Result<GeneratedIr, LoweringError> {
        let source = SourceFile {
            contents: contents.to_owned(),
            origin: SourceFileOrigin::Memory,
        };
        let root = Parser::parse_program(&source);

        LoweringContext::lower(&root)
    }

    fn instructions_of(ir: &GeneratedIr) -> Vec<Instruction> {
        ir.instructions().map(|i| (*i).clone()).collect()
    }

    fn assign(var: &str, left: &str) -> Instruction {
        Instruction::Assign {
            var: var.to_owned(),
            left: left.to_owned(),
            operator: None,
            right: None,
        }
    }

    fn assign_op(var: &str, left: &str, operator: &str, right: &str) -> Instruction {
        Instruction::Assign {
            var: var.to_owned(),
            left: left.to_owned(),
            operator: Some(operator.to_owned()),
            right: Some(right.to_owned()),
        }
    }

    fn jump(target: &str) -> Instruction {
        Instruction::Jump {
            target: target.to_owned(),
        }
    }

    fn label(name: &str) -> Instruction {
        Instruction::Label {
            name: name.to_owned(),
        }
    }

    fn compare(left: &str, operator: &str, right: &str, target: &str) -> Instruction {
        Instruction::Compare {
            left: left.to_owned(),
            operator: operator.to_owned(),
            right: right.to_owned(),
            target: target.to_owned(),
        }
    }

    #[test]
    fn arithmetic_initializer_goes_through_a_temporary() {
        let ir = lower_source("int a = 2 + 3; print(a);");

        assert_eq!(
            instructions_of(&ir),
            vec![
                assign_op("T1", "2", "+", "3"),
                assign("a", "T1"),
                Instruction::Print {
                    kind: PrintKind::Int,
                    value: "a".to_owned(),
                },
            ]
        );
        assert_eq!(ir.identifiers.get("a"), Some(&VarType::Int));
        assert_eq!(ir.identifiers.get("T1"), Some(&VarType::Int));
    }

    #[test]
    fn operands_evaluate_left_to_right() {
        let ir = lower_source("int x = 1 - 2 + 3;");

        assert_eq!(
            instructions_of(&ir),
            vec![
                assign_op("T1", "1", "-", "2"),
                assign_op("T2", "T1", "+", "3"),
                assign("x", "T2"),
            ]
        );
    }

    #[test]
    fn no_instruction_nests_expressions() {
        let ir = lower_source("int x = 1 + 2 * 3 - 4 / 5;");

        for instruction in ir.instructions() {
            let Instruction::Assign {
                left,
                operator,
                right,
                ..
            } = &*instruction
            else {
                continue;
            };

            // At most one operator application per instruction, and both
            // operands are plain names
            assert_eq!(operator.is_some(), right.is_some());
            for operand in [Some(left), right.as_ref()].into_iter().flatten() {
                assert!(
                    operand.chars().all(|c| c.is_ascii_alphanumeric()),
                    "compound operand: {operand}"
                );
            }
        }
    }

    #[test]
    fn lowering_is_deterministic() {
        let source = r#"
            int a = 1;
            string s = "hey";
            while (a < 10) { a = a + 1; }
            if (a == 10) { print(a); } else { prints(s); }
        "#;

        let first = lower_source(source);
        let second = lower_source(source);

        assert_eq!(instructions_of(&first), instructions_of(&second));
        assert_eq!(first.identifiers, second.identifiers);
        assert_eq!(first.constants, second.constants);
    }

    #[test]
    fn if_lowering_shape() {
        let ir = lower_source("int a = 1; if (a < 2) { a = 3; } else { a = 4; }");

        assert_eq!(
            instructions_of(&ir),
            vec![
                assign("a", "1"),
                compare("a", "<", "2", "L1"),
                jump("L2"),
                label("L1"),
                assign("a", "3"),
                jump("L3"),
                label("L2"),
                assign("a", "4"),
                label("L3"),
            ]
        );
    }

    #[test]
    fn if_without_else_still_emits_three_labels() {
        let ir = lower_source("int a = 1; if (a >= 2) { a = 3; }");

        let instructions = instructions_of(&ir);

        let labels = instructions
            .iter()
            .filter(|i| matches!(i, Instruction::Label { .. }))
            .count();
        let jumps = instructions
            .iter()
            .filter(|i| matches!(i, Instruction::Jump { .. }))
            .count();

        assert_eq!(labels, 3);
        assert_eq!(jumps, 2);
    }

    #[test]
    fn while_loops_back_to_the_start_label() {
        let ir = lower_source("int a = 0; while (a < 10) { a = a + 1; }");

        assert_eq!(
            instructions_of(&ir),
            vec![
                assign("a", "0"),
                label("L1"),
                compare("a", "<", "10", "L2"),
                jump("L3"),
                label("L2"),
                assign_op("T1", "a", "+", "1"),
                assign("a", "T1"),
                // Back to the condition, not to the compare's true target
                jump("L1"),
                label("L3"),
            ]
        );
    }

    #[test]
    fn string_declaration_records_a_constant() {
        let ir = lower_source("string s = \"hi\"; prints(s);");

        assert_eq!(
            instructions_of(&ir),
            vec![
                assign("s", "S1"),
                Instruction::Print {
                    kind: PrintKind::Str,
                    value: "s".to_owned(),
                },
            ]
        );
        assert_eq!(ir.constants.get("S1"), Some(&b"hi".to_vec()));
        assert_eq!(ir.identifiers.get("s"), Some(&VarType::Str));
    }

    #[test]
    fn string_literal_print_allocates_its_own_symbol() {
        let ir = lower_source("prints(\"hello\");");

        assert_eq!(
            instructions_of(&ir),
            vec![Instruction::Print {
                kind: PrintKind::Str,
                value: "S1".to_owned(),
            }]
        );
        assert_eq!(ir.constants.get("S1"), Some(&b"hello".to_vec()));
    }

    #[test]
    fn assignment_to_an_undeclared_name_defaults_to_string() {
        let ir = lower_source("a = 1;");

        assert_eq!(ir.identifiers.get("a"), Some(&VarType::Str));
    }

    #[test]
    fn assignment_does_not_override_a_declared_type() {
        let ir = lower_source("int a; a = 1;");

        assert_eq!(ir.identifiers.get("a"), Some(&VarType::Int));
    }

    #[test]
    fn coincidentally_equal_instructions_share_pool_storage() {
        let ir = lower_source("a = 1; a = 1;");

        assert_eq!(ir.code.len(), 2);
        assert_eq!(ir.code[0], ir.code[1]);
        assert_eq!(ir.pool.len(), 1);
    }

    #[test]
    fn multi_name_declaration_with_initializer_is_fatal() {
        let error = try_lower_source("int a, b = 5;").unwrap_err();

        assert!(matches!(
            error,
            LoweringError::MultiDeclarationInitializer { .. }
        ));
    }

    #[test]
    fn non_condition_node_in_condition_slot_is_fatal() {
        // The parser cannot produce this shape, so build the tree by hand
        let number = Rc::new(Node {
            span: Span::new(0, 1),
            kind: NodeKind::Number("1".to_owned()),
        });
        let body = Rc::new(Node {
            span: Span::new(0, 0),
            kind: NodeKind::Sequence {
                first: None,
                second: None,
            },
        });
        let root = Rc::new(Node {
            span: Span::new(0, 1),
            kind: NodeKind::If {
                condition: number,
                then_body: body,
                else_body: None,
            },
        });

        let error = LoweringContext::lower(&root).unwrap_err();

        assert!(matches!(error, LoweringError::MalformedCondition { .. }));
    }

    #[test]
    fn counters_are_never_reused_across_statements() {
        let ir = lower_source(
            "int a = 1 + 2; if (a > 0) { a = a + 1; } while (a < 9) { a = a + 1; }",
        );

        let mut label_names = Vec::new();
        let mut temp_names = Vec::new();

        for instruction in ir.instructions() {
            match &*instruction {
                Instruction::Label { name } => label_names.push(name.clone()),
                Instruction::Assign { var, .. } if var.starts_with('T') => {
                    temp_names.push(var.clone())
                }
                _ => {}
            }
        }

        label_names.sort();
        label_names.dedup();
        temp_names.dedup();

        assert_eq!(label_names, vec!["L1", "L2", "L3", "L4", "L5", "L6"]);
        assert_eq!(temp_names, vec!["T1", "T2", "T3"]);
    }
}
