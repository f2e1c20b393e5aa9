//! # Class File Format
//!
//! Reading and writing the subset of the JVM class file format that carries
//! annotation data (JVMS §4.1, §4.4, §4.7.16, §4.7.22).

mod bytes;
mod pool;
mod reader;
mod writer;

pub use reader::{ClassInfo, MemberInfo, read_class, read_records};
pub use writer::{ClassWriter, MemberDef};
