//! Block-structured name resolution.
//!
//! Frames form a stack with the global frame at the bottom. Inner frames may
//! shadow outer names; a frame never holds the same name twice.

use indexmap::IndexMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("Declaration error: '{name}' is already declared in this scope")]
    DuplicateDeclaration { name: String },
    #[error("Symbol '{name}' not found")]
    NotFound { name: String },
}

pub type Frame<T> = IndexMap<String, T>;

#[derive(Debug, Clone)]
pub struct SymbolTable<T> {
    frames: Vec<Frame<T>>,
}

impl<T> SymbolTable<T> {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new()],
        }
    }

    pub fn enter_scope(&mut self) {
        self.frames.push(Frame::new());
    }

    /// Pops the innermost frame. The global frame is never popped.
    pub fn exit_scope(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn declare(&mut self, name: impl Into<String>, info: T) -> Result<(), SymbolError> {
        let name = name.into();
        let frame = self.current_frame_mut();
        if frame.contains_key(&name) {
            return Err(SymbolError::DuplicateDeclaration { name });
        }
        frame.insert(name, info);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut T> {
        self.frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.get_mut(name))
    }

    pub fn lookup_in_current_scope(&self, name: &str) -> Option<&T> {
        self.frames.last().and_then(|frame| frame.get(name))
    }

    /// Replaces the info in the innermost frame that declares `name`.
    pub fn update(&mut self, name: &str, info: T) -> Result<(), SymbolError> {
        match self.lookup_mut(name) {
            Some(slot) => {
                *slot = info;
                Ok(())
            }
            None => Err(SymbolError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Every visible binding, outermost first, so shadowing names resolve to
    /// the innermost declaration.
    pub fn all_symbols(&self) -> IndexMap<&str, &T> {
        let mut merged = IndexMap::new();
        for frame in &self.frames {
            for (name, info) in frame {
                merged.insert(name.as_str(), info);
            }
        }
        merged
    }

    /// Bindings of the global frame in declaration order.
    pub fn globals(&self) -> impl Iterator<Item = (&str, &T)> {
        self.frames
            .iter()
            .take(1)
            .flat_map(|frame| frame.iter().map(|(name, info)| (name.as_str(), info)))
    }

    /// Hides every frame above the global one. Pair with [`restore_locals`]
    /// to give a callee a view of globals plus its own frames only.
    ///
    /// [`restore_locals`]: SymbolTable::restore_locals
    pub fn detach_locals(&mut self) -> Vec<Frame<T>> {
        self.frames.split_off(1)
    }

    /// Drops whatever frames the callee left behind and reinstates `saved`.
    pub fn restore_locals(&mut self, saved: Vec<Frame<T>>) {
        self.frames.truncate(1);
        self.frames.extend(saved);
    }

    fn current_frame_mut(&mut self) -> &mut Frame<T> {
        if self.frames.is_empty() {
            self.frames.push(Frame::new());
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
