//! Value representation and heap object layout.
//!
//! Every value is one 32-bit word. Small integers ("smis") carry a 31-bit
//! payload shifted left by one with tag bit 0 clear. Heap references are the
//! object's word-aligned address with the low bit set, so a field at byte
//! offset `n` is addressed as `object + n - HEAP_OBJECT_TAG`.
//!
//! Both the code generator and the simulator read these constants; nothing
//! else in the system is allowed to hard-code an offset.

/// Size of a machine word in bytes.
pub const POINTER_SIZE: i32 = 4;

pub const SMI_TAG: u32 = 0;
pub const SMI_TAG_SIZE: u32 = 1;
pub const SMI_TAG_MASK: u32 = 1;
pub const HEAP_OBJECT_TAG: u32 = 1;

/// Largest integer representable as a smi: 2^30 - 1.
pub const SMI_MAX: i32 = (1 << 30) - 1;
/// Smallest integer representable as a smi: -2^30.
pub const SMI_MIN: i32 = -(1 << 30);

/// Returns true if `value` fits the smi payload.
pub fn is_valid_smi(value: i64) -> bool {
    (SMI_MIN as i64..=SMI_MAX as i64).contains(&value)
}

/// Tag an integer. The caller guarantees the payload fits.
pub fn smi_from_int(value: i32) -> u32 {
    debug_assert!(is_valid_smi(value as i64), "{value} does not fit a smi");
    (value << SMI_TAG_SIZE) as u32
}

/// Untag a smi word.
pub fn smi_to_int(word: u32) -> i32 {
    (word as i32) >> SMI_TAG_SIZE
}

pub fn is_smi(word: u32) -> bool {
    word & SMI_TAG_MASK == SMI_TAG
}

/// Offset operand for a field of a tagged heap reference.
pub const fn field_offset(offset: i32) -> i32 {
    offset - HEAP_OBJECT_TAG as i32
}

// ---------------------------------------------------------------------------
// Object layouts (byte offsets from the untagged object start)
// ---------------------------------------------------------------------------

pub mod heap_object {
    pub const MAP_OFFSET: i32 = 0;
    pub const HEADER_SIZE: i32 = 4;
}

pub mod map {
    pub const INSTANCE_TYPE_OFFSET: i32 = 4;
    pub const BIT_FIELD_OFFSET: i32 = 8;
    pub const SIZE: i32 = 12;

    /// Bit in the bit field marking objects that compare like `undefined`.
    pub const IS_UNDETECTABLE: u32 = 1 << 4;
}

pub mod heap_number {
    /// Low word of the IEEE double.
    pub const VALUE_LO_OFFSET: i32 = 4;
    pub const VALUE_HI_OFFSET: i32 = 8;
    pub const SIZE: i32 = 12;
}

pub mod string {
    pub const LENGTH_OFFSET: i32 = 4;
    /// Index into the simulator's string table.
    pub const DATA_OFFSET: i32 = 8;
    pub const SIZE: i32 = 12;
}

pub mod oddball {
    pub const KIND_OFFSET: i32 = 4;
    pub const SIZE: i32 = 8;
}

pub mod fixed_array {
    pub const LENGTH_OFFSET: i32 = 4;
    pub const HEADER_SIZE: i32 = 8;

    pub const fn offset_of_element(index: i32) -> i32 {
        HEADER_SIZE + index * super::POINTER_SIZE
    }
}

pub mod js_object {
    /// Handle of the out-of-line property table.
    pub const PROPERTIES_OFFSET: i32 = 4;
    pub const ELEMENTS_OFFSET: i32 = 8;
    pub const SIZE: i32 = 12;
}

pub mod js_array {
    pub const LENGTH_OFFSET: i32 = super::js_object::SIZE;
    pub const SIZE: i32 = super::js_object::SIZE + 4;
}

pub mod js_function {
    /// Smi index of the compiled function in its module.
    pub const FUNCTION_ID_OFFSET: i32 = super::js_object::SIZE;
    pub const CONTEXT_OFFSET: i32 = super::js_object::SIZE + 4;
    pub const SIZE: i32 = super::js_object::SIZE + 8;
}

/// Slots at the start of every context record.
pub mod context {
    pub const CLOSURE_INDEX: i32 = 0;
    pub const FCONTEXT_INDEX: i32 = 1;
    pub const PREVIOUS_INDEX: i32 = 2;
    pub const EXTENSION_INDEX: i32 = 3;
    pub const GLOBAL_INDEX: i32 = 4;
    pub const MIN_CONTEXT_SLOTS: i32 = 5;

    pub const fn slot_offset(index: i32) -> i32 {
        super::fixed_array::offset_of_element(index)
    }
}

/// Exception handler record pushed on the machine stack by try statements.
pub mod stack_handler {
    pub const NEXT_OFFSET: i32 = 0;
    pub const STATE_OFFSET: i32 = 4;
    pub const FP_OFFSET: i32 = 8;
    pub const PC_OFFSET: i32 = 12;
    pub const SIZE: i32 = 16;
    pub const SIZE_IN_WORDS: usize = 4;

    pub const TRY_CATCH: i32 = 0;
    pub const TRY_FINALLY: i32 = 1;
}

// ---------------------------------------------------------------------------
// Instance types
// ---------------------------------------------------------------------------

pub mod instance_type {
    pub const STRING: u32 = 0x01;
    /// Everything below this value is a string.
    pub const FIRST_NONSTRING: u32 = 0x80;
    pub const HEAP_NUMBER: u32 = 0x81;
    pub const ODDBALL: u32 = 0x82;
    pub const MAP: u32 = 0x83;
    pub const FIXED_ARRAY: u32 = 0x84;

    pub const JS_OBJECT: u32 = 0xA0;
    pub const JS_GLOBAL_OBJECT: u32 = 0xA1;
    pub const JS_ARRAY: u32 = 0xA2;
    pub const FIRST_JS_OBJECT: u32 = JS_OBJECT;
    pub const LAST_JS_OBJECT: u32 = JS_ARRAY;
    pub const JS_FUNCTION: u32 = LAST_JS_OBJECT + 1;
}

/// Oddball kinds, stored in the oddball's kind field.
pub mod oddball_kind {
    pub const UNDEFINED: u32 = 0;
    pub const NULL: u32 = 1;
    pub const TRUE: u32 = 2;
    pub const FALSE: u32 = 3;
    pub const THE_HOLE: u32 = 4;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smi_range_edges() {
        assert!(is_valid_smi(SMI_MAX as i64));
        assert!(is_valid_smi(SMI_MIN as i64));
        assert!(!is_valid_smi(SMI_MAX as i64 + 1));
        assert!(!is_valid_smi(SMI_MIN as i64 - 1));
    }

    #[test]
    fn smi_tagging_preserves_sign_and_order() {
        for v in [0, 1, -1, 42, SMI_MAX, SMI_MIN] {
            let w = smi_from_int(v);
            assert!(is_smi(w));
            assert_eq!(smi_to_int(w), v);
        }
        assert!((smi_from_int(-3) as i32) < (smi_from_int(2) as i32));
    }

    #[test]
    fn field_offsets_strip_heap_tag() {
        assert_eq!(field_offset(heap_object::MAP_OFFSET), -1);
        assert_eq!(context::slot_offset(context::MIN_CONTEXT_SLOTS), 28);
    }

    #[test]
    fn function_type_follows_js_object_range() {
        assert_eq!(instance_type::JS_FUNCTION, instance_type::LAST_JS_OBJECT + 1);
        assert!(instance_type::STRING < instance_type::FIRST_NONSTRING);
    }
}
