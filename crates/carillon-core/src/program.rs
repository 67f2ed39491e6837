//! The program tree: a root block plus the table of declared streams.

use indexmap::IndexMap;

use crate::identifier::Id;
use crate::stmt::{Block, StreamKind};

/// A complete pulse-control program.
///
/// Built once per construction sequence, immutable once handed to the
/// serializer, and discarded after use.
///
/// The stream table records every result stream declared in the program in
/// declaration order; `save`/`process`/`adc` references are validated
/// against it at serialization time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub body: Block,
    pub streams: IndexMap<Id, StreamKind>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kind of a declared stream, if present.
    pub fn stream_kind(&self, name: Id) -> Option<StreamKind> {
        self.streams.get(&name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_table_lookup() {
        let mut program = Program::new();
        program.streams.insert(Id::new("s_x"), StreamKind::Int);
        program.streams.insert(Id::new("raw"), StreamKind::Adc);

        assert_eq!(program.stream_kind(Id::new("s_x")), Some(StreamKind::Int));
        assert_eq!(program.stream_kind(Id::new("raw")), Some(StreamKind::Adc));
        assert_eq!(program.stream_kind(Id::new("missing")), None);
    }

    #[test]
    fn test_stream_table_preserves_declaration_order() {
        let mut program = Program::new();
        program.streams.insert(Id::new("b"), StreamKind::Fixed);
        program.streams.insert(Id::new("a"), StreamKind::Int);

        let names: Vec<String> = program.streams.keys().map(|id| id.resolve()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
