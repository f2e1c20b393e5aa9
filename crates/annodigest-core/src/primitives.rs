//! # Format Primitives
//!
//! Fixed constants of the class file format and the engine's input limits.
//!
//! These values are compiled into the binary and are immutable at runtime.

/// Magic number that opens every class file.
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Class file major version emitted by the writer (Java 8).
pub const DEFAULT_MAJOR_VERSION: u16 = 52;

// =============================================================================
// CONSTANT POOL TAGS
// =============================================================================

pub const CONSTANT_UTF8: u8 = 1;
pub const CONSTANT_INTEGER: u8 = 3;
pub const CONSTANT_FLOAT: u8 = 4;
pub const CONSTANT_LONG: u8 = 5;
pub const CONSTANT_DOUBLE: u8 = 6;
pub const CONSTANT_CLASS: u8 = 7;
pub const CONSTANT_STRING: u8 = 8;
pub const CONSTANT_FIELDREF: u8 = 9;
pub const CONSTANT_METHODREF: u8 = 10;
pub const CONSTANT_INTERFACE_METHODREF: u8 = 11;
pub const CONSTANT_NAME_AND_TYPE: u8 = 12;
pub const CONSTANT_METHOD_HANDLE: u8 = 15;
pub const CONSTANT_METHOD_TYPE: u8 = 16;
pub const CONSTANT_DYNAMIC: u8 = 17;
pub const CONSTANT_INVOKE_DYNAMIC: u8 = 18;
pub const CONSTANT_MODULE: u8 = 19;
pub const CONSTANT_PACKAGE: u8 = 20;

// =============================================================================
// ACCESS FLAGS
// =============================================================================

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;

// =============================================================================
// ATTRIBUTE NAMES
// =============================================================================

pub const ATTR_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
pub const ATTR_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
pub const ATTR_ANNOTATION_DEFAULT: &str = "AnnotationDefault";

// =============================================================================
// WELL-KNOWN TYPES & NAMES
// =============================================================================

/// Root of every class hierarchy; excluded from walks by default.
pub const OBJECT_TYPE: &str = "java/lang/Object";

pub const STRING_DESCRIPTOR: &str = "Ljava/lang/String;";
pub const CLASS_DESCRIPTOR: &str = "Ljava/lang/Class;";

/// Conventional name of an annotation's single attribute.
pub const PRIMARY_ATTRIBUTE: &str = "value";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum size of a single class file accepted by the reader (64 MB).
///
/// Validated before parsing to bound allocation on corrupted input.
pub const MAX_CLASS_FILE_SIZE: usize = 64 * 1024 * 1024;

/// Maximum nesting depth of element values (nested annotations and arrays).
pub const MAX_ELEMENT_NESTING: usize = 64;

/// Maximum size of a canonical digest export (256 MB).
pub const MAX_EXPORT_SIZE: usize = 256 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_is_cafebabe() {
        assert_eq!(CLASS_MAGIC.to_be_bytes(), [0xCA, 0xFE, 0xBA, 0xBE]);
    }

    #[test]
    fn annotation_flag_implies_interface_bit_is_distinct() {
        assert_eq!(ACC_ANNOTATION & ACC_INTERFACE, 0);
    }
}
