//! Call frames.

use std::rc::Rc;

use crate::value::Closure;

/// A per-call activation record.
///
/// `ip` starts at -1 so the pre-increment at the top of the VM loop
/// lands on offset 0. `base_pointer` is the value-stack index where this
/// frame's locals begin.
pub struct Frame {
    pub cl: Rc<Closure>,
    pub ip: i64,
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(cl: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            cl,
            ip: -1,
            base_pointer,
        }
    }
}
