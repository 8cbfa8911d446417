//! The Monkey virtual machine.
//!
//! A frame-based interpreter over a fixed value stack. One instruction
//! executes per loop iteration: the current frame's instruction pointer
//! is pre-incremented, the opcode fetched and dispatched, and each arm
//! advances the pointer past its operands.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::builtins::BUILTINS;
use crate::code::{self, read_u16, read_u8, Bytecode, Opcode};
use crate::frame::Frame;
use crate::value::{Closure, CompiledFunction, HashPair, Type, Value};

/// Value stack capacity.
pub const STACK_SIZE: usize = 2048;
/// Call frame capacity.
pub const MAX_FRAMES: usize = 1024;
/// Globals array capacity.
pub const MAX_GLOBALS: usize = 65536;

/// Runtime errors. These terminate the VM loop; host errors produced by
/// builtins are ordinary `Value::Error`s and do not pass through here.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,

    #[error("frame overflow")]
    FrameOverflow,

    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongArity { want: usize, got: usize },

    #[error("unsupported types for binary operation: {left} {right}")]
    UnsupportedBinaryTypes { left: Type, right: Type },

    #[error("unknown operator: {op} ({left} {right})")]
    UnknownOperator { op: &'static str, left: Type, right: Type },

    #[error("unsupported type for negation: {operand}")]
    UnsupportedNegation { operand: Type },

    #[error("unsupported type for bitwise NOT: {operand}")]
    UnsupportedBitwiseNot { operand: Type },

    #[error("unusable as hash key: {key}")]
    UnhashableKey { key: Type },

    #[error("index operator not supported: left={left} index={index}")]
    IndexNotSupported { left: Type, index: Type },

    #[error("index out of range: {index}")]
    IndexOutOfRange { index: i64 },

    #[error("division by zero")]
    DivisionByZero,

    #[error("calling non-closure and non-builtin")]
    CallingNonCallable,

    #[error("not a function: {kind}")]
    NotAFunctionConstant { kind: Type },

    #[error("opcode {byte} undefined")]
    UndefinedOpcode { byte: u8 },
}

/// The virtual machine.
pub struct VM {
    pub debug: bool,

    constants: Vec<Value>,

    frames: Vec<Frame>,

    stack: Vec<Value>,
    sp: usize, // Always points to the next value. Top of stack is stack[sp-1]

    globals: Vec<Value>,

    // Closures rewired by SetSelf hold themselves in a free slot. Their
    // capture vectors are cleared on drop to break the Rc cycles.
    self_closures: Vec<Rc<Closure>>,
}

impl VM {
    /// Create a VM for the given bytecode with a fresh globals array.
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_globals(bytecode, vec![Value::Null; MAX_GLOBALS])
    }

    /// Create a VM that reuses an existing globals array, as the REPL
    /// does between lines.
    pub fn with_globals(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        let main_fn = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure {
            func: main_fn,
            free: RefCell::new(Vec::new()),
        });

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));

        Self {
            debug: false,
            constants: bytecode.constants,
            frames,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            self_closures: Vec::new(),
        }
    }

    /// Take back the globals array for reuse in a later run.
    pub fn take_globals(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.globals)
    }

    /// The value most recently popped off the stack; the result of the
    /// final expression statement once `run` has finished.
    pub fn last_popped(&self) -> &Value {
        &self.stack[self.sp]
    }

    /// The current stack pointer. Zero after a balanced program.
    pub fn sp(&self) -> usize {
        self.sp
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    // The popped slot keeps its value so last_popped can read it.
    fn pop(&mut self) -> Value {
        self.sp -= 1;
        self.stack[self.sp].clone()
    }

    /// Execute until the main frame's instruction stream is exhausted.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.current_frame().ip
            < self.current_frame().cl.func.instructions.len() as i64 - 1
        {
            self.current_frame_mut().ip += 1;

            let func = Rc::clone(&self.current_frame().cl.func);
            let ins = &func.instructions;
            let ip = self.current_frame().ip as usize;

            let op = Opcode::from_byte(ins[ip])
                .ok_or(RuntimeError::UndefinedOpcode { byte: ins[ip] })?;

            if self.debug {
                self.trace(ins, ip, op);
            }

            match op {
                Opcode::LoadConstant => {
                    let const_index = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;

                    self.push(self.constants[const_index].clone())?;
                }

                Opcode::LoadBuiltin => {
                    let builtin_index = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;

                    self.push(Value::Builtin(&BUILTINS[builtin_index]))?;
                }

                Opcode::LoadGlobal => {
                    let global_index = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;

                    self.push(self.globals[global_index].clone())?;
                }

                Opcode::BindGlobal => {
                    let global_index = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;

                    let value = self.pop();
                    self.globals[global_index] = value.bind_clone();
                    self.push(Value::Null)?;
                }

                Opcode::AssignGlobal => {
                    let global_index = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;

                    self.globals[global_index] = self.pop();
                    self.push(Value::Null)?;
                }

                Opcode::LoadLocal => {
                    let local_index = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;

                    let base_pointer = self.current_frame().base_pointer;
                    self.push(self.stack[base_pointer + local_index].clone())?;
                }

                Opcode::BindLocal => {
                    let local_index = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;

                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.pop();
                    self.stack[base_pointer + local_index] = value.bind_clone();
                    self.push(Value::Null)?;
                }

                Opcode::AssignLocal => {
                    let local_index = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;

                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.pop();
                    self.stack[base_pointer + local_index] = value;
                    self.push(Value::Null)?;
                }

                Opcode::LoadFree => {
                    let free_index = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;

                    let value = self.current_frame().cl.free.borrow()[free_index].clone();
                    self.push(value)?;
                }

                Opcode::SetSelf => {
                    let free_index = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;

                    let cl = Rc::clone(&self.current_frame().cl);
                    let already_set = matches!(
                        &cl.free.borrow()[free_index],
                        Value::Closure(existing) if Rc::ptr_eq(existing, &cl)
                    );
                    if !already_set {
                        cl.free.borrow_mut()[free_index] = Value::Closure(Rc::clone(&cl));
                        self.self_closures.push(cl);
                    }
                }

                Opcode::LoadTrue => self.push(Value::Boolean(true))?,
                Opcode::LoadFalse => self.push(Value::Boolean(false))?,
                Opcode::LoadNull => self.push(Value::Null)?,

                Opcode::MakeArray => {
                    let num_elements = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;

                    let elements = self.stack[self.sp - num_elements..self.sp].to_vec();
                    self.sp -= num_elements;

                    self.push(Value::array(elements))?;
                }

                Opcode::MakeHash => {
                    let num_elements = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;

                    let hash = self.build_hash(self.sp - num_elements, self.sp)?;
                    self.sp -= num_elements;

                    self.push(hash)?;
                }

                Opcode::MakeClosure => {
                    let const_index = read_u16(&ins[ip + 1..]) as usize;
                    let num_free = read_u8(&ins[ip + 3..]) as usize;
                    self.current_frame_mut().ip += 3;

                    self.push_closure(const_index, num_free)?;
                }

                Opcode::GetItem => {
                    let index = self.pop();
                    let left = self.pop();

                    self.execute_index_expression(left, index)?;
                }

                Opcode::SetItem => {
                    let value = self.pop();
                    let index = self.pop();
                    let left = self.pop();

                    self.execute_index_assignment(left, index, value)?;
                    self.push(Value::Null)?;
                }

                Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::BitwiseOr
                | Opcode::BitwiseXor
                | Opcode::BitwiseAnd
                | Opcode::And
                | Opcode::Or => {
                    self.execute_binary_operation(op)?;
                }

                Opcode::Equal
                | Opcode::NotEqual
                | Opcode::GreaterThan
                | Opcode::GreaterThanEqual => {
                    self.execute_comparison(op)?;
                }

                Opcode::Bang | Opcode::Not => {
                    let operand = self.pop();
                    self.push(Value::Boolean(!operand.is_truthy()))?;
                }

                Opcode::Minus => {
                    let operand = self.pop();
                    match operand {
                        Value::Integer(value) => {
                            self.push(Value::Integer(value.wrapping_neg()))?
                        }
                        other => {
                            return Err(RuntimeError::UnsupportedNegation {
                                operand: other.kind(),
                            })
                        }
                    }
                }

                Opcode::BitwiseNot => {
                    let operand = self.pop();
                    match operand {
                        Value::Integer(value) => self.push(Value::Integer(!value))?,
                        other => {
                            return Err(RuntimeError::UnsupportedBitwiseNot {
                                operand: other.kind(),
                            })
                        }
                    }
                }

                Opcode::JumpIfFalse => {
                    let target = read_u16(&ins[ip + 1..]) as i64;
                    self.current_frame_mut().ip += 2;

                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target - 1;
                    }
                }

                Opcode::Jump => {
                    let target = read_u16(&ins[ip + 1..]) as i64;
                    self.current_frame_mut().ip = target - 1;
                }

                Opcode::Call => {
                    let num_args = read_u8(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 1;

                    self.execute_call(num_args)?;
                }

                Opcode::Return => {
                    let return_value = self.pop();

                    if self.frames.len() == 1 {
                        // Returning from the top-level frame terminates
                        // the program with the returned value.
                        self.sp = 0;
                        self.stack[0] = return_value;
                        return Ok(());
                    }

                    let frame = self.frames.pop().expect("frame stack is never empty");
                    self.sp = frame.base_pointer - 1;

                    self.push(return_value)?;
                }

                Opcode::Pop => {
                    self.pop();
                }

                Opcode::Noop => {}
            }
        }

        Ok(())
    }

    fn trace(&self, ins: &[u8], ip: usize, op: Opcode) {
        let def = op.definition();
        let (operands, _) = code::read_operands(def, &ins[ip + 1..]);
        let rendered = match operands.as_slice() {
            [] => def.name.to_string(),
            [a] => format!("{} {}", def.name, a),
            [a, b] => format!("{} {} {}", def.name, a, b),
            _ => def.name.to_string(),
        };
        eprintln!(
            "{:04} {:<24} [ip={:02} fp={:02} sp={:02}]",
            ip,
            rendered,
            ip,
            self.frames.len() - 1,
            self.sp
        );
    }

    fn execute_binary_operation(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop();
        let left = self.pop();

        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                self.execute_binary_integer_operation(op, *l, *r)
            }
            (Value::Str(l), Value::Str(r)) => match op {
                Opcode::Add => {
                    let mut result = l.as_ref().clone();
                    result.push_str(r);
                    self.push(Value::string(result))
                }
                _ => Err(RuntimeError::UnknownOperator {
                    op: op.definition().name,
                    left: left.kind(),
                    right: right.kind(),
                }),
            },
            (Value::Boolean(l), Value::Boolean(r)) => match op {
                Opcode::And => self.push(Value::Boolean(*l && *r)),
                Opcode::Or => self.push(Value::Boolean(*l || *r)),
                _ => Err(RuntimeError::UnknownOperator {
                    op: op.definition().name,
                    left: left.kind(),
                    right: right.kind(),
                }),
            },
            (Value::Array(l), Value::Array(r)) => match op {
                Opcode::Add => {
                    let mut merged = l.borrow().clone();
                    merged.extend(r.borrow().iter().cloned());
                    self.push(Value::array(merged))
                }
                _ => Err(RuntimeError::UnknownOperator {
                    op: op.definition().name,
                    left: left.kind(),
                    right: right.kind(),
                }),
            },
            (Value::Hash(l), Value::Hash(r)) => match op {
                Opcode::Add => {
                    // Right-hand pairs override left-hand ones.
                    let mut merged = l.borrow().clone();
                    for (key, pair) in r.borrow().iter() {
                        merged.insert(*key, pair.clone());
                    }
                    self.push(Value::hash(merged))
                }
                _ => Err(RuntimeError::UnknownOperator {
                    op: op.definition().name,
                    left: left.kind(),
                    right: right.kind(),
                }),
            },
            (Value::Array(elements), Value::Integer(n))
            | (Value::Integer(n), Value::Array(elements))
                if op == Opcode::Mul =>
            {
                let elements = elements.borrow();
                let count = (*n).max(0) as usize;
                let mut repeated = Vec::with_capacity(elements.len() * count);
                for _ in 0..count {
                    repeated.extend(elements.iter().cloned());
                }
                self.push(Value::array(repeated))
            }
            (Value::Str(s), Value::Integer(n)) | (Value::Integer(n), Value::Str(s))
                if op == Opcode::Mul =>
            {
                self.push(Value::string(s.repeat((*n).max(0) as usize)))
            }
            _ => Err(RuntimeError::UnsupportedBinaryTypes {
                left: left.kind(),
                right: right.kind(),
            }),
        }
    }

    fn execute_binary_integer_operation(
        &mut self,
        op: Opcode,
        left: i64,
        right: i64,
    ) -> Result<(), RuntimeError> {
        let result = match op {
            Opcode::Add => left.wrapping_add(right),
            Opcode::Sub => left.wrapping_sub(right),
            Opcode::Mul => left.wrapping_mul(right),
            Opcode::Div => {
                if right == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                left.wrapping_div(right)
            }
            Opcode::Mod => {
                if right == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                left.wrapping_rem(right)
            }
            Opcode::BitwiseOr => left | right,
            Opcode::BitwiseXor => left ^ right,
            Opcode::BitwiseAnd => left & right,
            _ => {
                return Err(RuntimeError::UnknownOperator {
                    op: op.definition().name,
                    left: Type::Integer,
                    right: Type::Integer,
                })
            }
        };

        self.push(Value::Integer(result))
    }

    fn execute_comparison(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop();
        let left = self.pop();

        let result = match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => match op {
                Opcode::Equal => l == r,
                Opcode::NotEqual => l != r,
                Opcode::GreaterThan => l > r,
                Opcode::GreaterThanEqual => l >= r,
                _ => unreachable!("non-comparison opcode dispatched as comparison"),
            },
            (Value::Str(l), Value::Str(r)) => match op {
                Opcode::Equal => l == r,
                Opcode::NotEqual => l != r,
                Opcode::GreaterThan => l > r,
                Opcode::GreaterThanEqual => l >= r,
                _ => unreachable!("non-comparison opcode dispatched as comparison"),
            },
            _ => match op {
                Opcode::Equal => left.equals(&right),
                Opcode::NotEqual => !left.equals(&right),
                _ => {
                    return Err(RuntimeError::UnknownOperator {
                        op: op.definition().name,
                        left: left.kind(),
                        right: right.kind(),
                    })
                }
            },
        };

        self.push(Value::Boolean(result))
    }

    fn execute_index_expression(
        &mut self,
        left: Value,
        index: Value,
    ) -> Result<(), RuntimeError> {
        match (&left, &index) {
            (Value::Str(s), Value::Integer(i)) => {
                let bytes = s.as_bytes();
                if *i < 0 || *i >= bytes.len() as i64 {
                    return self.push(Value::string(""));
                }
                self.push(Value::string(
                    (bytes[*i as usize] as char).to_string(),
                ))
            }
            (Value::Array(elements), Value::Integer(i)) => {
                let elements = elements.borrow();
                if *i < 0 || *i >= elements.len() as i64 {
                    return self.push(Value::Null);
                }
                let element = elements[*i as usize].clone();
                drop(elements);
                self.push(element)
            }
            (Value::Hash(pairs), _) => {
                let key = index
                    .hash_key()
                    .ok_or(RuntimeError::UnhashableKey { key: index.kind() })?;
                let value = pairs
                    .borrow()
                    .get(&key)
                    .map(|pair| pair.value.clone())
                    .unwrap_or(Value::Null);
                self.push(value)
            }
            _ => Err(RuntimeError::IndexNotSupported {
                left: left.kind(),
                index: index.kind(),
            }),
        }
    }

    fn execute_index_assignment(
        &mut self,
        left: Value,
        index: Value,
        value: Value,
    ) -> Result<(), RuntimeError> {
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(i)) => {
                let mut elements = elements.borrow_mut();
                if *i < 0 || *i >= elements.len() as i64 {
                    return Err(RuntimeError::IndexOutOfRange { index: *i });
                }
                elements[*i as usize] = value;
                Ok(())
            }
            (Value::Hash(pairs), _) => {
                let key = index
                    .hash_key()
                    .ok_or(RuntimeError::UnhashableKey { key: index.kind() })?;
                pairs.borrow_mut().insert(key, HashPair { key: index, value });
                Ok(())
            }
            _ => Err(RuntimeError::IndexNotSupported {
                left: left.kind(),
                index: index.kind(),
            }),
        }
    }

    fn build_hash(
        &self,
        start_index: usize,
        end_index: usize,
    ) -> Result<Value, RuntimeError> {
        let mut pairs = HashMap::new();

        let mut i = start_index;
        while i < end_index {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();

            let hash_key = key
                .hash_key()
                .ok_or(RuntimeError::UnhashableKey { key: key.kind() })?;
            pairs.insert(hash_key, HashPair { key, value });

            i += 2;
        }

        Ok(Value::hash(pairs))
    }

    fn push_closure(
        &mut self,
        const_index: usize,
        num_free: usize,
    ) -> Result<(), RuntimeError> {
        let constant = self.constants[const_index].clone();
        let function = match constant {
            Value::Function(func) => func,
            other => {
                return Err(RuntimeError::NotAFunctionConstant { kind: other.kind() })
            }
        };

        let free = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;

        self.push(Value::Closure(Rc::new(Closure {
            func: function,
            free: RefCell::new(free),
        })))
    }

    fn execute_call(&mut self, num_args: usize) -> Result<(), RuntimeError> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Value::Closure(cl) => self.call_closure(cl, num_args),
            Value::Builtin(builtin) => self.call_builtin(builtin, num_args),
            _ => Err(RuntimeError::CallingNonCallable),
        }
    }

    fn call_closure(
        &mut self,
        cl: Rc<Closure>,
        num_args: usize,
    ) -> Result<(), RuntimeError> {
        if num_args != cl.func.num_parameters {
            return Err(RuntimeError::WrongArity {
                want: cl.func.num_parameters,
                got: num_args,
            });
        }

        // Tail-call fast path: when the very next opcode returns and the
        // callee shares this frame's function, reuse the frame instead
        // of pushing a new one.
        let frame = self.current_frame();
        let next_ip = frame.ip as usize + 1;
        let is_tail_call = frame.cl.func.instructions.get(next_ip)
            == Some(&(Opcode::Return as u8))
            && Rc::ptr_eq(&cl.func, &frame.cl.func);

        if is_tail_call {
            let base_pointer = frame.base_pointer;
            for i in 0..num_args {
                self.stack[base_pointer + i] = self.stack[self.sp - num_args + i].clone();
            }
            self.sp -= num_args + 1;

            let frame = self.current_frame_mut();
            frame.cl = cl;
            frame.ip = -1;
            return Ok(());
        }

        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::FrameOverflow);
        }

        let base_pointer = self.sp - num_args;
        let num_locals = cl.func.num_locals;
        self.frames.push(Frame::new(cl, base_pointer));
        self.sp = base_pointer + num_locals;

        Ok(())
    }

    fn call_builtin(
        &mut self,
        builtin: &'static crate::builtins::Builtin,
        num_args: usize,
    ) -> Result<(), RuntimeError> {
        let args = self.stack[self.sp - num_args..self.sp].to_vec();

        let result = (builtin.func)(&args);
        self.sp = self.sp - num_args - 1;

        self.push(result)
    }
}

impl Drop for VM {
    fn drop(&mut self) {
        for closure in self.self_closures.drain(..) {
            closure.free.borrow_mut().clear();
        }
    }
}
