//! The scope stack.
//!
//! Frames are pooled: buffers allocated for a nesting depth are kept after the
//! frame is popped and reused by the next frame at that depth. Only
//! `frames[..depth]` is live.

use std::rc::Rc;

use crate::ast::Stmt;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Default)]
struct Frame {
    variables: Vec<Variable>,
    defers: Vec<Rc<Stmt>>,
}

/// Why a push onto the stack was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthExceeded {
    pub max_depth: usize,
}

#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<Frame>,
    depth: usize,
    max_depth: usize,
}

impl ScopeStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            depth: 0,
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn push(&mut self) -> Result<(), DepthExceeded> {
        if self.depth >= self.max_depth {
            return Err(DepthExceeded {
                max_depth: self.max_depth,
            });
        }

        if self.depth == self.frames.len() {
            self.frames.push(Frame::default());
        }
        self.depth += 1;
        Ok(())
    }

    /// Drop the top frame. Its deferred statements are discarded, not run;
    /// callers drain them with [`ScopeStack::pop_defer`] first.
    pub fn pop(&mut self) {
        if self.depth == 0 {
            return;
        }
        self.depth -= 1;
        let frame = &mut self.frames[self.depth];
        frame.variables.clear();
        frame.defers.clear();
    }

    /// Pop frames until only `depth` remain, without running defers.
    pub fn truncate(&mut self, depth: usize) {
        while self.depth > depth {
            self.pop();
        }
    }

    fn top_mut(&mut self) -> Option<&mut Frame> {
        if self.depth == 0 {
            None
        } else {
            self.frames.get_mut(self.depth - 1)
        }
    }

    /// True if `name` is live in the top frame.
    pub fn declared_in_top(&self, name: &str) -> bool {
        self.depth > 0
            && self.frames[self.depth - 1]
                .variables
                .iter()
                .any(|var| var.name == name)
    }

    /// Append a variable to the top frame. Redeclaration is checked by the
    /// caller through [`ScopeStack::declared_in_top`].
    pub fn declare(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.top_mut() {
            frame.variables.push(Variable {
                name: name.to_string(),
                value,
            });
        }
    }

    /// Innermost-to-outermost search; the first name match wins.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames[..self.depth]
            .iter()
            .rev()
            .find_map(|frame| frame.variables.iter().find(|var| var.name == name))
            .map(|var| &var.value)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.frames[..self.depth]
            .iter_mut()
            .rev()
            .find_map(|frame| frame.variables.iter_mut().find(|var| var.name == name))
            .map(|var| &mut var.value)
    }

    pub fn register_defer(&mut self, stmt: Rc<Stmt>) {
        if let Some(frame) = self.top_mut() {
            frame.defers.push(stmt);
        }
    }

    /// Most recently registered defer of the top frame.
    pub fn pop_defer(&mut self) -> Option<Rc<Stmt>> {
        self.top_mut().and_then(|frame| frame.defers.pop())
    }

    /// Live variables of the top frame in declaration order.
    #[cfg(test)]
    fn top_variables(&self) -> &[Variable] {
        if self.depth == 0 {
            &[]
        } else {
            &self.frames[self.depth - 1].variables
        }
    }

    /// Number of frames allocated so far, live or pooled.
    #[cfg(test)]
    fn allocated_frames(&self) -> usize {
        self.frames.len()
    }
}
