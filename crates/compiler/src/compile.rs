//! AST to bytecode compiler.
//!
//! A recursive lowering over the AST. Each function literal gets its own
//! compilation scope with an instruction buffer and bookkeeping of the
//! last two emitted instructions, which drives trailing-`Pop` stripping
//! and jump patching.

use std::rc::Rc;

use monkey_syntax::ast::{Block, Expr, InfixOp, PrefixOp, Program, Span, Stmt};
use monkey_syntax::SourceError;
use monkey_vm::builtins::BUILTINS;
use monkey_vm::code::{make, Bytecode, Instructions, Opcode};
use monkey_vm::value::{CompiledFunction, Value};

use crate::symbol_table::{Scope, Symbol, SymbolTable};

/// Compile-time errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    #[error("undefined variable {name}")]
    UndefinedVariable { name: String, span: Span },

    #[error("invalid assignment target: {target}")]
    InvalidAssignmentTarget { target: String, span: Span },

    #[error("unknown operator {op}")]
    UnknownOperator { op: String, span: Span },
}

impl CompileError {
    /// Get the span associated with this error.
    pub fn span(&self) -> Span {
        match self {
            CompileError::UndefinedVariable { span, .. }
            | CompileError::InvalidAssignmentTarget { span, .. }
            | CompileError::UnknownOperator { span, .. } => *span,
        }
    }

    /// Convert to a SourceError for pretty printing.
    pub fn to_source_error(&self) -> SourceError {
        match self {
            CompileError::UndefinedVariable { name, span } => {
                SourceError::undefined_variable(name, *span)
            }
            CompileError::InvalidAssignmentTarget { target, span } => {
                SourceError::invalid_assignment_target(target, *span)
            }
            CompileError::UnknownOperator { op, span } => {
                SourceError::unknown_operator(op, *span)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

/// Per-function instruction buffer with last-instruction bookkeeping.
#[derive(Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// The compiler.
pub struct Compiler {
    constants: Vec<Value>,
    scopes: Vec<CompilationScope>,
    symbol_table: SymbolTable,
}

impl Compiler {
    /// Create a compiler with a fresh symbol table. Builtins are
    /// registered under their table indices.
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }
        Self::with_state(symbol_table, Vec::new())
    }

    /// Create a compiler that continues from existing symbols and
    /// constants, as the REPL does between lines.
    pub fn with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Self {
            constants,
            scopes: vec![CompilationScope::default()],
            symbol_table,
        }
    }

    /// Hand back the symbol table and constant pool for the next run.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbol_table, self.constants)
    }

    /// The finished instruction stream and constant pool.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scopes[self.scopes.len() - 1].instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    /// Compile a whole program into the current scope.
    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    fn compile_statement(&mut self, statement: &Stmt) -> Result<(), CompileError> {
        match statement {
            Stmt::Expr(expression) => {
                self.compile_expression(expression)?;
                self.emit(Opcode::Pop, &[]);
            }
            Stmt::Return(value, _) => {
                self.compile_expression(value)?;
                self.emit(Opcode::Return, &[]);
            }
        }
        Ok(())
    }

    /// Compile a block. Blocks are expressions: a trailing `Pop` is
    /// stripped so the last statement's value remains on the stack, and
    /// a block that ends without a value (or is empty) yields null.
    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }

        if self.last_instruction_is(Opcode::Pop) {
            self.remove_last_pop();
        } else if !self.last_instruction_is(Opcode::Return) {
            self.emit(Opcode::LoadNull, &[]);
        }

        Ok(())
    }

    fn compile_expression(&mut self, expression: &Expr) -> Result<(), CompileError> {
        match expression {
            Expr::Integer(value, _) => {
                let const_index = self.add_constant(Value::Integer(*value));
                self.emit(Opcode::LoadConstant, &[const_index]);
            }

            Expr::Str(value, _) => {
                let const_index = self.add_constant(Value::string(value.clone()));
                self.emit(Opcode::LoadConstant, &[const_index]);
            }

            Expr::Boolean(value, _) => {
                if *value {
                    self.emit(Opcode::LoadTrue, &[]);
                } else {
                    self.emit(Opcode::LoadFalse, &[]);
                }
            }

            Expr::Null(_) => {
                self.emit(Opcode::LoadNull, &[]);
            }

            Expr::Ident(name) => {
                let symbol = self.symbol_table.resolve(&name.node).ok_or_else(|| {
                    CompileError::UndefinedVariable {
                        name: name.node.clone(),
                        span: name.span,
                    }
                })?;
                self.load_symbol(&symbol);
            }

            Expr::Prefix(op, right, _) => {
                self.compile_expression(right)?;
                let opcode = match op {
                    PrefixOp::Not => Opcode::Not,
                    PrefixOp::BitNot => Opcode::BitwiseNot,
                    PrefixOp::Neg => Opcode::Minus,
                };
                self.emit(opcode, &[]);
            }

            Expr::Infix(op, left, right, _) => {
                // `<` and `<=` compile their operands in reversed order
                // and reuse the greater-than opcodes.
                if matches!(op, InfixOp::Lt | InfixOp::LtEq) {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    let opcode = if *op == InfixOp::LtEq {
                        Opcode::GreaterThanEqual
                    } else {
                        Opcode::GreaterThan
                    };
                    self.emit(opcode, &[]);
                    return Ok(());
                }

                self.compile_expression(left)?;
                self.compile_expression(right)?;

                let opcode = match op {
                    InfixOp::Add => Opcode::Add,
                    InfixOp::Sub => Opcode::Sub,
                    InfixOp::Mul => Opcode::Mul,
                    InfixOp::Div => Opcode::Div,
                    InfixOp::Mod => Opcode::Mod,
                    InfixOp::BitOr => Opcode::BitwiseOr,
                    InfixOp::BitXor => Opcode::BitwiseXor,
                    InfixOp::BitAnd => Opcode::BitwiseAnd,
                    InfixOp::And => Opcode::And,
                    InfixOp::Or => Opcode::Or,
                    InfixOp::Gt => Opcode::GreaterThan,
                    InfixOp::GtEq => Opcode::GreaterThanEqual,
                    InfixOp::Eq => Opcode::Equal,
                    InfixOp::NotEq => Opcode::NotEqual,
                    InfixOp::Lt | InfixOp::LtEq => unreachable!("handled above"),
                };
                self.emit(opcode, &[]);
            }

            Expr::Bind {
                target,
                value,
                span,
            } => {
                let Expr::Ident(name) = target.as_ref() else {
                    return Err(CompileError::InvalidAssignmentTarget {
                        target: target.to_string(),
                        span: *span,
                    });
                };

                let symbol = match self.symbol_table.resolve(&name.node) {
                    None => self.symbol_table.define(&name.node),
                    // Rebinding a captured (or builtin) name shadows it
                    // with a fresh slot in the current scope.
                    Some(existing)
                        if existing.scope == Scope::Free
                            || existing.scope == Scope::Builtin =>
                    {
                        self.symbol_table.define(&name.node)
                    }
                    Some(existing) => existing,
                };

                self.compile_expression(value)?;

                if symbol.scope == Scope::Global {
                    self.emit(Opcode::BindGlobal, &[symbol.index]);
                } else {
                    self.emit(Opcode::BindLocal, &[symbol.index]);
                }
            }

            Expr::Assign {
                target,
                value,
                span,
            } => match target.as_ref() {
                Expr::Ident(name) => {
                    let symbol =
                        self.symbol_table.resolve(&name.node).ok_or_else(|| {
                            CompileError::UndefinedVariable {
                                name: name.node.clone(),
                                span: name.span,
                            }
                        })?;

                    match symbol.scope {
                        Scope::Global | Scope::Local => {}
                        // Captured and builtin names have no assignable
                        // slot.
                        Scope::Free | Scope::Builtin => {
                            return Err(CompileError::InvalidAssignmentTarget {
                                target: name.node.clone(),
                                span: *span,
                            })
                        }
                    }

                    self.compile_expression(value)?;

                    if symbol.scope == Scope::Global {
                        self.emit(Opcode::AssignGlobal, &[symbol.index]);
                    } else {
                        self.emit(Opcode::AssignLocal, &[symbol.index]);
                    }
                }
                Expr::Index { left, index, .. } => {
                    self.compile_expression(left)?;
                    self.compile_expression(index)?;
                    self.compile_expression(value)?;
                    self.emit(Opcode::SetItem, &[]);
                }
                other => {
                    return Err(CompileError::InvalidAssignmentTarget {
                        target: other.to_string(),
                        span: *span,
                    })
                }
            },

            Expr::Index { left, index, .. } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::GetItem, &[]);
            }

            Expr::Array(elements, _) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::MakeArray, &[elements.len()]);
            }

            Expr::Hash(pairs, _) => {
                // Stable constant-pool order: keys sort by their source
                // rendering.
                let mut sorted: Vec<&(Expr, Expr)> = pairs.iter().collect();
                sorted.sort_by_cached_key(|(key, _)| key.to_string());

                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::MakeHash, &[pairs.len() * 2]);
            }

            Expr::If {
                condition,
                consequence,
                alternative,
                ..
            } => {
                self.compile_expression(condition)?;

                // Placeholder operand, patched once the consequence is
                // compiled.
                let jump_if_false_pos = self.emit(Opcode::JumpIfFalse, &[0xFFFF]);

                self.compile_block(consequence)?;
                if self.last_instruction_is(Opcode::Pop) {
                    self.remove_last_pop();
                }

                let jump_pos = self.emit(Opcode::Jump, &[0xFFFF]);

                let after_consequence = self.current_instructions().len();
                self.change_operand(jump_if_false_pos, after_consequence);

                match alternative {
                    None => {
                        self.emit(Opcode::LoadNull, &[]);
                    }
                    Some(alternative) => {
                        self.compile_block(alternative)?;
                        if self.last_instruction_is(Opcode::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }

                let after_alternative = self.current_instructions().len();
                self.change_operand(jump_pos, after_alternative);
            }

            Expr::While {
                condition, body, ..
            } => {
                let condition_pos = self.current_instructions().len();

                self.compile_expression(condition)?;
                let jump_if_false_pos = self.emit(Opcode::JumpIfFalse, &[0xFFFF]);

                self.compile_block(body)?;
                // Discard the body's value before looping.
                self.emit(Opcode::Pop, &[]);
                self.emit(Opcode::Jump, &[condition_pos]);

                let after_body = self.emit(Opcode::LoadNull, &[]);
                self.change_operand(jump_if_false_pos, after_body);
            }

            Expr::Function(func) => {
                self.enter_scope();

                if let Some(name) = &func.name {
                    // The bound name becomes a free slot the closure
                    // fills with itself on entry, so recursion works
                    // before the outer binding is stored.
                    let symbol = self.symbol_table.resolve(name).ok_or_else(|| {
                        CompileError::UndefinedVariable {
                            name: name.clone(),
                            span: func.span,
                        }
                    })?;
                    let symbol = self.symbol_table.define_free(symbol);
                    self.emit(Opcode::SetSelf, &[symbol.index]);
                }

                for parameter in &func.parameters {
                    self.symbol_table.define(&parameter.node);
                }

                self.compile_block(&func.body)?;

                if self.last_instruction_is(Opcode::Pop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(Opcode::Return) {
                    if !self.last_instruction_is(Opcode::LoadNull) {
                        self.emit(Opcode::LoadNull, &[]);
                    }
                    self.emit(Opcode::Return, &[]);
                }

                let free_symbols = self.symbol_table.free_symbols.clone();
                let num_locals = self.symbol_table.num_definitions;
                let instructions = self.leave_scope();

                for symbol in &free_symbols {
                    self.load_symbol(symbol);
                }

                let compiled = CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters: func.parameters.len(),
                };
                let fn_index = self.add_constant(Value::Function(Rc::new(compiled)));
                self.emit(Opcode::MakeClosure, &[fn_index, free_symbols.len()]);
            }

            Expr::Call {
                function,
                arguments,
                ..
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Opcode::Call, &[arguments.len()]);
            }
        }

        Ok(())
    }

    // === Emission helpers ===

    fn current_instructions(&self) -> &Instructions {
        &self.scopes[self.scopes.len() - 1].instructions
    }

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.add_instruction(&instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn add_instruction(&mut self, instruction: &[u8]) -> usize {
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        let position = scope.instructions.len();
        scope.instructions.extend_from_slice(instruction);
        position
    }

    fn set_last_instruction(&mut self, opcode: Opcode, position: usize) {
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, op: Opcode) -> bool {
        let scope = self.scopes.last().expect("scope stack is never empty");
        if scope.instructions.is_empty() {
            return false;
        }
        scope.last_instruction.map(|last| last.opcode) == Some(op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        let last = scope
            .last_instruction
            .expect("remove_last_pop without a last instruction");
        scope.instructions.truncate(last.position);
        scope.last_instruction = scope.previous_instruction;
    }

    fn replace_instruction(&mut self, position: usize, new_instruction: &[u8]) {
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        scope.instructions[position..position + new_instruction.len()]
            .copy_from_slice(new_instruction);
    }

    // Single-opcode overwrite; only valid while the widths match.
    fn replace_last_pop_with_return(&mut self) {
        let last_position = self.scopes.last().expect("scope stack is never empty")
            .last_instruction
            .expect("replace_last_pop_with_return without a last instruction")
            .position;
        self.replace_instruction(last_position, &make(Opcode::Return, &[]));

        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        scope.last_instruction = Some(EmittedInstruction {
            opcode: Opcode::Return,
            position: last_position,
        });
    }

    /// Re-encode the instruction at `position` with a new operand.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = Opcode::from_byte(self.current_instructions()[position])
            .expect("patch target is an encoded instruction");
        let new_instruction = make(op, &[operand]);
        self.replace_instruction(position, &new_instruction);
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            Scope::Global => self.emit(Opcode::LoadGlobal, &[symbol.index]),
            Scope::Local => self.emit(Opcode::LoadLocal, &[symbol.index]),
            Scope::Builtin => self.emit(Opcode::LoadBuiltin, &[symbol.index]),
            Scope::Free => self.emit(Opcode::LoadFree, &[symbol.index]),
        };
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("leave_scope below the main scope");
        self.symbol_table = self
            .symbol_table
            .take_outer()
            .expect("leave_scope below the program symbol table");
        scope.instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
