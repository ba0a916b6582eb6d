// VCDIFF default code table (RFC 3284, Section 5.6).
//
// 256 entries, each holding one or two instructions. The table is built
// once on first use and shared read-only by every decode.
//
//   0        RUN, size 0
//   1        ADD, size 0
//   2..18    ADD, sizes 1..17
//   19..162  COPY modes 0..8: size 0, then sizes 4..18
//   163..234 ADD(1..4) + COPY(4..6), modes 0..5
//   235..246 ADD(1..4) + COPY(4), modes 6..8
//   247..255 COPY(4) + ADD(1), modes 0..8
//
// A size of 0 means the real size follows as a varint in the instruction
// section.

use std::sync::LazyLock;

use super::address_cache::{MODE_COUNT, S_NEAR};

/// Minimum COPY length with its own opcode.
pub const MIN_MATCH: u8 = 4;

/// Instruction kind of one half of a code table entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InstKind {
    #[default]
    Noop,
    Add,
    Run,
    /// COPY with its address mode (0..=8).
    Copy(u8),
}

/// One instruction slot of a code table entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Half {
    pub kind: InstKind,
    pub size: u8,
}

impl Half {
    const fn new(kind: InstKind, size: u8) -> Self {
        Self { kind, size }
    }
}

/// A single entry in the 256-element code table. `second` is a NOOP for
/// single-instruction opcodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CodeTableEntry {
    pub first: Half,
    pub second: Half,
}

impl CodeTableEntry {
    fn single(kind: InstKind, size: u8) -> Self {
        Self {
            first: Half::new(kind, size),
            second: Half::default(),
        }
    }

    fn double(first: Half, second: Half) -> Self {
        Self { first, second }
    }
}

pub type CodeTable = [CodeTableEntry; 256];

/// Build the default RFC 3284 code table.
pub fn build_default_code_table() -> CodeTable {
    const ADD_SIZES: u8 = 17;
    const CPY_SIZES: u8 = 15;
    const ADDCOPY_ADD_MAX: u8 = 4;
    const ADDCOPY_NEAR_CPY_MAX: u8 = 6;
    const ADDCOPY_SAME_CPY_MAX: u8 = 4;
    const COPYADD_CPY_MAX: u8 = 4;
    const NEAR_LIMIT: u8 = 2 + S_NEAR as u8;

    let mut tbl = [CodeTableEntry::default(); 256];
    let mut idx: usize = 0;
    let mut push = |entry: CodeTableEntry| {
        tbl[idx] = entry;
        idx += 1;
    };

    push(CodeTableEntry::single(InstKind::Run, 0));
    push(CodeTableEntry::single(InstKind::Add, 0));
    for size in 1..=ADD_SIZES {
        push(CodeTableEntry::single(InstKind::Add, size));
    }

    for mode in 0..MODE_COUNT {
        push(CodeTableEntry::single(InstKind::Copy(mode), 0));
        for size in MIN_MATCH..MIN_MATCH + CPY_SIZES {
            push(CodeTableEntry::single(InstKind::Copy(mode), size));
        }
    }

    for mode in 0..MODE_COUNT {
        let cpy_max = if mode < NEAR_LIMIT {
            ADDCOPY_NEAR_CPY_MAX
        } else {
            ADDCOPY_SAME_CPY_MAX
        };
        for add_size in 1..=ADDCOPY_ADD_MAX {
            for cpy_size in MIN_MATCH..=cpy_max {
                push(CodeTableEntry::double(
                    Half::new(InstKind::Add, add_size),
                    Half::new(InstKind::Copy(mode), cpy_size),
                ));
            }
        }
    }

    for mode in 0..MODE_COUNT {
        for cpy_size in MIN_MATCH..=COPYADD_CPY_MAX {
            push(CodeTableEntry::double(
                Half::new(InstKind::Copy(mode), cpy_size),
                Half::new(InstKind::Add, 1),
            ));
        }
    }

    debug_assert_eq!(idx, 256, "code table must have exactly 256 entries");
    tbl
}

/// The lazily built default code table.
pub fn default_code_table() -> &'static CodeTable {
    static TABLE: LazyLock<CodeTable> = LazyLock::new(build_default_code_table);
    &TABLE
}
