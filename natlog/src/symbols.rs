use core::fmt;
use std::collections::HashMap;

use arcstr::ArcStr;

/// A symbol table index.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Sym(u32);

impl Sym {
    pub fn into_i32(self) -> i32 {
        self.0 as i32
    }

    pub fn from_payload(payload: i32) -> Self {
        Self(payload as u32)
    }
}

impl fmt::Debug for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sym({})", self.0)
    }
}

/// Interned identifier strings: an append-only vector plus its reverse map.
pub struct SymbolTable {
    names: Vec<ArcStr>,
    index: HashMap<ArcStr, Sym>,
}

/// Symbols with pinned indices, interned before any program text.
const RESERVED: [ArcStr; 6] = [
    arcstr::literal!("true"),
    arcstr::literal!(":-"),
    arcstr::literal!(","),
    arcstr::literal!("[]"),
    arcstr::literal!("."),
    arcstr::literal!("nil"),
];

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = Self {
            names: Vec::new(),
            index: HashMap::new(),
        };
        for name in RESERVED {
            table.intern(&name);
        }
        table
    }

    /// Returns the existing index for `name`, or appends it.
    pub fn intern(&mut self, name: &str) -> Sym {
        if let Some(&sym) = self.index.get(name) {
            return sym;
        }
        let sym = Sym(self.names.len() as u32);
        let name = ArcStr::from(name);
        self.names.push(name.clone());
        self.index.insert(name, sym);
        sym
    }

    pub fn resolve(&self, sym: Sym) -> Option<&ArcStr> {
        self.names.get(sym.0 as usize)
    }

    pub fn nil(&self) -> Sym {
        Sym(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut table = SymbolTable::new();
        let a = table.intern("member");
        let b = table.intern("cons");
        assert_ne!(a, b);
        assert_eq!(table.intern("member"), a);
        assert_eq!(table.resolve(a).map(ArcStr::as_str), Some("member"));
    }

    #[test]
    fn reserved_symbols_are_pinned() {
        let mut table = SymbolTable::new();
        assert_eq!(table.intern("nil"), table.nil());
        assert_eq!(table.resolve(table.nil()).map(ArcStr::as_str), Some("nil"));
        assert_eq!(table.intern("true").into_i32(), 0);
    }
}
