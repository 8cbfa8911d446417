//! A persistent compile-and-run session.
//!
//! The symbol table, constant pool and globals array survive between
//! lines, so a binding made on one line is visible on the next. Each
//! line runs on a fresh VM that borrows the session's globals.

use monkey_compiler::{CompileError, Compiler, SymbolTable};
use monkey_syntax::{parse, SourceError};
use monkey_vm::vm::{RuntimeError, MAX_GLOBALS, VM};
use monkey_vm::Value;

/// Why a line failed to evaluate.
#[derive(Debug)]
pub enum SessionError {
    Parse(Vec<SourceError>),
    Compile(CompileError),
    Runtime(RuntimeError),
}

/// REPL state carried across lines.
pub struct Session {
    symbol_table: SymbolTable,
    constants: Vec<Value>,
    globals: Vec<Value>,
    pub debug: bool,
}

impl Session {
    pub fn new() -> Self {
        // Steal the initial symbol table (with builtins registered)
        // from a throwaway compiler.
        let (symbol_table, constants) = Compiler::new().into_state();
        Self {
            symbol_table,
            constants,
            globals: vec![Value::Null; MAX_GLOBALS],
            debug: false,
        }
    }

    /// Parse, compile and run one line, returning the value of its last
    /// expression statement.
    pub fn eval(&mut self, source: &str) -> Result<Value, SessionError> {
        let (program, errors) = parse(source);
        if !errors.is_empty() {
            return Err(SessionError::Parse(errors));
        }
        let program = match program {
            Some(program) => program,
            None => return Err(SessionError::Parse(Vec::new())),
        };

        let symbol_table = std::mem::take(&mut self.symbol_table);
        let constants = std::mem::take(&mut self.constants);
        let mut compiler = Compiler::with_state(symbol_table, constants);

        let compile_result = compiler.compile(&program);
        let bytecode = compiler.bytecode();
        let (symbol_table, constants) = compiler.into_state();
        self.symbol_table = symbol_table;
        self.constants = constants;

        if let Err(err) = compile_result {
            return Err(SessionError::Compile(err));
        }

        let globals = std::mem::take(&mut self.globals);
        let mut vm = VM::with_globals(bytecode, globals);
        vm.debug = self.debug;

        let run_result = vm.run();
        let value = vm.last_popped().clone();
        self.globals = vm.take_globals();

        match run_result {
            Ok(()) => Ok(value),
            Err(err) => Err(SessionError::Runtime(err)),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_survive_across_lines() {
        let mut session = Session::new();
        session.eval("x := 40;").expect("bind should evaluate");
        let value = session.eval("x + 2").expect("use should evaluate");
        assert!(value.equals(&Value::Integer(42)));
    }

    #[test]
    fn test_functions_survive_across_lines() {
        let mut session = Session::new();
        session
            .eval("double := fn(n) { return n * 2; };")
            .expect("bind should evaluate");
        let value = session.eval("double(21)").expect("call should evaluate");
        assert!(value.equals(&Value::Integer(42)));
    }

    #[test]
    fn test_parse_error_does_not_poison_session() {
        let mut session = Session::new();
        assert!(matches!(session.eval("1 +"), Err(SessionError::Parse(_))));
        let value = session.eval("1 + 2").expect("valid line should evaluate");
        assert!(value.equals(&Value::Integer(3)));
    }

    #[test]
    fn test_compile_error_does_not_poison_session() {
        let mut session = Session::new();
        assert!(matches!(
            session.eval("nope"),
            Err(SessionError::Compile(_))
        ));
        session.eval("nope := 1;").expect("bind should evaluate");
        let value = session.eval("nope").expect("use should evaluate");
        assert!(value.equals(&Value::Integer(1)));
    }

    #[test]
    fn test_runtime_error_keeps_earlier_globals() {
        let mut session = Session::new();
        session.eval("x := 7;").expect("bind should evaluate");
        assert!(matches!(
            session.eval("1 / 0"),
            Err(SessionError::Runtime(RuntimeError::DivisionByZero))
        ));
        let value = session.eval("x").expect("use should evaluate");
        assert!(value.equals(&Value::Integer(7)));
    }

    #[test]
    fn test_aggregates_alias_across_lines() {
        let mut session = Session::new();
        session.eval("xs := [1, 2];").expect("bind should evaluate");
        session.eval("ys := xs;").expect("alias should evaluate");
        session.eval("xs[0] = 9;").expect("store should evaluate");
        let value = session.eval("ys[0]").expect("read should evaluate");
        assert!(value.equals(&Value::Integer(9)));
    }
}
