use log::trace;
use std::collections::HashMap;

use super::c_utils::{CStmt, Rhs};
use super::namegen::NameGenerator;
use crate::common::Type;

/// Deduplicates emitted assignments within a block.
///
/// Keys are structural: the assigned type, the emitter, and the operand identifiers. Operands of
/// commutative operations are sorted in the key so `a + b` and `b + a` share a temporary.
///
/// Frames mirror C scopes. A temporary declared in an inner scope is forgotten when that scope
/// closes, while temporaries from enclosing scopes stay visible inside it.
pub struct ValueCache {
    frames: Vec<Frame>,
}

#[derive(Default)]
struct Frame {
    values: HashMap<CacheKey, String>,
    tables: HashMap<Vec<i32>, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    ty: Type,
    rhs: Rhs,
}

impl ValueCache {
    pub fn new() -> Self {
        ValueCache {
            frames: vec![Frame::default()],
        }
    }

    /// Returns the temporary holding `rhs`, emitting an assignment into `out` only if no
    /// structurally identical value is live.
    pub fn assign(
        &mut self,
        ty: Type,
        rhs: Rhs,
        commutative: bool,
        namer: &mut NameGenerator,
        out: &mut Vec<CStmt>,
    ) -> String {
        let key = CacheKey::new(ty, &rhs, commutative);
        if let Some(name) = self.lookup(&key) {
            trace!("Reusing {} for {:?}", name, rhs.emitter);
            return name.to_string();
        }
        let name = namer.fresh_name();
        out.push(CStmt::Assign {
            ty,
            name: name.clone(),
            rhs,
        });
        self.top().values.insert(key, name.clone());
        name
    }

    /// Returns the name of a live index table with exactly these entries.
    pub fn table(&self, values: &[i32]) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.tables.get(values))
            .map(String::as_str)
    }

    pub fn insert_table(&mut self, values: Vec<i32>, name: String) {
        self.top().tables.insert(values, name);
    }

    pub fn push_scope(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.frames.len() > 1, "popped the function scope");
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Forgets every cached value. Index tables are constant data and survive.
    pub fn invalidate_all(&mut self) {
        for frame in &mut self.frames {
            frame.values.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.frames.iter().map(|f| f.values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &CacheKey) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.values.get(key))
            .map(String::as_str)
    }

    fn top(&mut self) -> &mut Frame {
        if self.frames.is_empty() {
            self.frames.push(Frame::default());
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}

impl Default for ValueCache {
    fn default() -> Self {
        ValueCache::new()
    }
}

impl CacheKey {
    fn new(ty: Type, rhs: &Rhs, commutative: bool) -> Self {
        let mut rhs = rhs.clone();
        if commutative {
            rhs.args.sort_unstable();
        }
        CacheKey { ty, rhs }
    }
}
