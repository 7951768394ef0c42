//! The middle of the compiler flattens the program tree into three-address
//! IR: structured control flow becomes labels and jumps, and expression
//! trees become ordered assignments into synthesized temporaries.

pub mod ir;
