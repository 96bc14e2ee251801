//! Process-level helpers shared by the binary and the bus backends.

pub mod bootstrap;
