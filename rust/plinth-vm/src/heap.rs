//! Heap objects in simulator memory.
//!
//! Objects use the layouts the generated code reads directly (maps,
//! instance types, fixed array elements, context slots, function context).
//! String contents and named property tables live on the host side and are
//! referenced from the object by smi index.

use plinth_core::isa::Root;
use plinth_core::layout::{
    context, fixed_array, heap_number, heap_object, instance_type, is_smi, is_valid_smi, js_array,
    js_function, js_object, map, oddball, oddball_kind, smi_from_int, smi_to_int, string,
    HEAP_OBJECT_TAG,
};
use plinth_core::module::FunctionId;

use crate::error::{Result, VmError};
use crate::memory::Memory;

pub fn tag(address: u32) -> u32 {
    address | HEAP_OBJECT_TAG
}

pub fn untag(word: u32) -> u32 {
    word & !HEAP_OBJECT_TAG
}

/// Host side of a JS object.
#[derive(Debug, Default, Clone)]
struct ObjectData {
    /// Named properties in insertion order.
    properties: Vec<(String, u32)>,
    /// Tagged prototype, or zero for none.
    prototype: u32,
}

#[derive(Debug, Clone, Copy)]
struct Maps {
    string: u32,
    heap_number: u32,
    oddball: u32,
    fixed_array: u32,
    js_object: u32,
    js_global: u32,
    js_array: u32,
    js_function: u32,
    undetectable: u32,
}

#[derive(Debug, Clone, Copy)]
struct Roots {
    undefined: u32,
    null: u32,
    true_value: u32,
    false_value: u32,
    the_hole: u32,
    empty_fixed_array: u32,
}

#[derive(Debug)]
pub struct Heap {
    pub memory: Memory,
    strings: Vec<String>,
    objects: Vec<ObjectData>,
    maps: Maps,
    roots: Roots,
}

impl Heap {
    pub fn new(heap_bytes: u32, stack_bytes: u32) -> Result<Self> {
        let mut memory = Memory::new(heap_bytes, stack_bytes);
        let meta = tag(memory.allocate(map::SIZE as u32)?);
        write_map(&mut memory, meta, meta, instance_type::MAP, 0)?;
        let new_map = |memory: &mut Memory, ty: u32, bits: u32| -> Result<u32> {
            let m = tag(memory.allocate(map::SIZE as u32)?);
            write_map(memory, m, meta, ty, bits)?;
            Ok(m)
        };
        let maps = Maps {
            string: new_map(&mut memory, instance_type::STRING, 0)?,
            heap_number: new_map(&mut memory, instance_type::HEAP_NUMBER, 0)?,
            oddball: new_map(&mut memory, instance_type::ODDBALL, 0)?,
            fixed_array: new_map(&mut memory, instance_type::FIXED_ARRAY, 0)?,
            js_object: new_map(&mut memory, instance_type::JS_OBJECT, 0)?,
            js_global: new_map(&mut memory, instance_type::JS_GLOBAL_OBJECT, 0)?,
            js_array: new_map(&mut memory, instance_type::JS_ARRAY, 0)?,
            js_function: new_map(&mut memory, instance_type::JS_FUNCTION, 0)?,
            undetectable: new_map(&mut memory, instance_type::JS_OBJECT, map::IS_UNDETECTABLE)?,
        };
        let oddball_of = |memory: &mut Memory, kind: u32| -> Result<u32> {
            let o = tag(memory.allocate(oddball::SIZE as u32)?);
            memory.write(field(o, heap_object::MAP_OFFSET), maps.oddball)?;
            memory.write(field(o, oddball::KIND_OFFSET), kind)?;
            Ok(o)
        };
        let undefined = oddball_of(&mut memory, oddball_kind::UNDEFINED)?;
        let null = oddball_of(&mut memory, oddball_kind::NULL)?;
        let true_value = oddball_of(&mut memory, oddball_kind::TRUE)?;
        let false_value = oddball_of(&mut memory, oddball_kind::FALSE)?;
        let the_hole = oddball_of(&mut memory, oddball_kind::THE_HOLE)?;
        let empty_fixed_array = tag(memory.allocate(fixed_array::HEADER_SIZE as u32)?);
        memory.write(field(empty_fixed_array, heap_object::MAP_OFFSET), maps.fixed_array)?;
        memory.write(field(empty_fixed_array, fixed_array::LENGTH_OFFSET), smi_from_int(0))?;

        Ok(Self {
            memory,
            strings: Vec::new(),
            objects: Vec::new(),
            maps,
            roots: Roots {
                undefined,
                null,
                true_value,
                false_value,
                the_hole,
                empty_fixed_array,
            },
        })
    }

    pub fn root(&self, root: Root) -> u32 {
        match root {
            Root::Undefined => self.roots.undefined,
            Root::Null => self.roots.null,
            Root::True => self.roots.true_value,
            Root::False => self.roots.false_value,
            Root::TheHole => self.roots.the_hole,
            Root::HeapNumberMap => self.maps.heap_number,
        }
    }

    pub fn undefined(&self) -> u32 {
        self.roots.undefined
    }

    pub fn null(&self) -> u32 {
        self.roots.null
    }

    pub fn boolean(&self, value: bool) -> u32 {
        if value {
            self.roots.true_value
        } else {
            self.roots.false_value
        }
    }

    // -----------------------------------------------------------------------
    // Raw field access
    // -----------------------------------------------------------------------

    pub fn read_field(&self, object: u32, offset: i32) -> Result<u32> {
        self.check_heap_object(object)?;
        self.memory.read(field(object, offset))
    }

    pub fn write_field(&mut self, object: u32, offset: i32, value: u32) -> Result<()> {
        self.check_heap_object(object)?;
        self.memory.write(field(object, offset), value)
    }

    fn check_heap_object(&self, word: u32) -> Result<()> {
        if is_smi(word) || !self.memory.is_heap_address(untag(word)) {
            return Err(VmError::BadOperand(format!("{word:#010x} is not a heap object")));
        }
        Ok(())
    }

    pub fn is_heap_object(&self, word: u32) -> bool {
        self.check_heap_object(word).is_ok()
    }

    pub fn instance_type(&self, word: u32) -> Option<u32> {
        let map = self.read_field(word, heap_object::MAP_OFFSET).ok()?;
        self.read_field(map, map::INSTANCE_TYPE_OFFSET).ok()
    }

    pub fn is_string(&self, word: u32) -> bool {
        self.instance_type(word)
            .is_some_and(|t| t < instance_type::FIRST_NONSTRING)
    }

    pub fn is_heap_number(&self, word: u32) -> bool {
        self.instance_type(word) == Some(instance_type::HEAP_NUMBER)
    }

    pub fn is_js_object(&self, word: u32) -> bool {
        self.instance_type(word).is_some_and(|t| {
            (instance_type::FIRST_JS_OBJECT..=instance_type::JS_FUNCTION).contains(&t)
        })
    }

    pub fn is_array(&self, word: u32) -> bool {
        self.instance_type(word) == Some(instance_type::JS_ARRAY)
    }

    pub fn is_function(&self, word: u32) -> bool {
        self.instance_type(word) == Some(instance_type::JS_FUNCTION)
    }

    pub fn is_undetectable(&self, word: u32) -> bool {
        self.read_field(word, heap_object::MAP_OFFSET)
            .and_then(|m| self.read_field(m, map::BIT_FIELD_OFFSET))
            .is_ok_and(|bits| bits & map::IS_UNDETECTABLE != 0)
    }

    // -----------------------------------------------------------------------
    // Strings and numbers
    // -----------------------------------------------------------------------

    pub fn alloc_string(&mut self, value: &str) -> Result<u32> {
        let index = self.strings.len();
        self.strings.push(value.to_string());
        let s = tag(self.memory.allocate(string::SIZE as u32)?);
        self.write_field(s, heap_object::MAP_OFFSET, self.maps.string)?;
        let length = value.chars().count() as i32;
        self.write_field(s, string::LENGTH_OFFSET, smi_from_int(length))?;
        self.write_field(s, string::DATA_OFFSET, smi_from_int(index as i32))?;
        Ok(s)
    }

    pub fn string_value(&self, word: u32) -> Result<&str> {
        if !self.is_string(word) {
            return Err(VmError::BadOperand(format!("{word:#010x} is not a string")));
        }
        let index = smi_to_int(self.read_field(word, string::DATA_OFFSET)?) as usize;
        self.strings
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| VmError::BadOperand(format!("string index {index}")))
    }

    /// Always boxes, even integral values.
    pub fn alloc_heap_number(&mut self, value: f64) -> Result<u32> {
        let n = tag(self.memory.allocate(heap_number::SIZE as u32)?);
        let bits = value.to_bits();
        self.write_field(n, heap_object::MAP_OFFSET, self.maps.heap_number)?;
        self.write_field(n, heap_number::VALUE_LO_OFFSET, bits as u32)?;
        self.write_field(n, heap_number::VALUE_HI_OFFSET, (bits >> 32) as u32)?;
        Ok(n)
    }

    /// A smi when the value has an exact smi representation.
    pub fn number(&mut self, value: f64) -> Result<u32> {
        let is_int = value.fract() == 0.0 && !(value == 0.0 && value.is_sign_negative());
        if is_int && is_valid_smi(value as i64) {
            return Ok(smi_from_int(value as i32));
        }
        self.alloc_heap_number(value)
    }

    pub fn number_value(&self, word: u32) -> Option<f64> {
        if is_smi(word) {
            return Some(f64::from(smi_to_int(word)));
        }
        if !self.is_heap_number(word) {
            return None;
        }
        let lo = self.read_field(word, heap_number::VALUE_LO_OFFSET).ok()?;
        let hi = self.read_field(word, heap_number::VALUE_HI_OFFSET).ok()?;
        Some(f64::from_bits((u64::from(hi) << 32) | u64::from(lo)))
    }

    // -----------------------------------------------------------------------
    // Fixed arrays and contexts
    // -----------------------------------------------------------------------

    pub fn alloc_fixed_array(&mut self, values: &[u32]) -> Result<u32> {
        if values.is_empty() {
            return Ok(self.roots.empty_fixed_array);
        }
        let bytes = fixed_array::offset_of_element(values.len() as i32) as u32;
        let a = tag(self.memory.allocate(bytes)?);
        self.write_field(a, heap_object::MAP_OFFSET, self.maps.fixed_array)?;
        self.write_field(a, fixed_array::LENGTH_OFFSET, smi_from_int(values.len() as i32))?;
        for (i, &v) in values.iter().enumerate() {
            self.write_field(a, fixed_array::offset_of_element(i as i32), v)?;
        }
        Ok(a)
    }

    pub fn fixed_array_length(&self, array: u32) -> Result<usize> {
        Ok(smi_to_int(self.read_field(array, fixed_array::LENGTH_OFFSET)?) as usize)
    }

    pub fn fixed_array_get(&self, array: u32, index: usize) -> Result<u32> {
        self.read_field(array, fixed_array::offset_of_element(index as i32))
    }

    /// A context record with `slots` slots, the header filled in.
    pub fn alloc_context(
        &mut self,
        slots: usize,
        closure: u32,
        previous: u32,
        global: u32,
    ) -> Result<u32> {
        let slots = slots.max(context::MIN_CONTEXT_SLOTS as usize);
        let undefined = self.undefined();
        let c = self.alloc_fixed_array(&vec![undefined; slots])?;
        self.write_field(c, context::slot_offset(context::CLOSURE_INDEX), closure)?;
        self.write_field(c, context::slot_offset(context::FCONTEXT_INDEX), c)?;
        self.write_field(c, context::slot_offset(context::PREVIOUS_INDEX), previous)?;
        self.write_field(c, context::slot_offset(context::GLOBAL_INDEX), global)?;
        Ok(c)
    }

    // -----------------------------------------------------------------------
    // JS objects
    // -----------------------------------------------------------------------

    fn alloc_js_object(&mut self, map: u32, size: i32, prototype: u32) -> Result<u32> {
        let index = self.objects.len();
        self.objects.push(ObjectData {
            properties: Vec::new(),
            prototype,
        });
        let o = tag(self.memory.allocate(size as u32)?);
        self.write_field(o, heap_object::MAP_OFFSET, map)?;
        self.write_field(o, js_object::PROPERTIES_OFFSET, smi_from_int(index as i32))?;
        self.write_field(o, js_object::ELEMENTS_OFFSET, self.roots.empty_fixed_array)?;
        Ok(o)
    }

    pub fn alloc_object(&mut self, prototype: u32) -> Result<u32> {
        self.alloc_js_object(self.maps.js_object, js_object::SIZE, prototype)
    }

    pub fn alloc_global_object(&mut self) -> Result<u32> {
        self.alloc_js_object(self.maps.js_global, js_object::SIZE, 0)
    }

    /// An object that compares equal to `undefined` and `null`.
    pub fn alloc_undetectable(&mut self) -> Result<u32> {
        self.alloc_js_object(self.maps.undetectable, js_object::SIZE, 0)
    }

    pub fn alloc_array(&mut self, values: &[u32]) -> Result<u32> {
        let a = self.alloc_js_object(self.maps.js_array, js_array::SIZE, 0)?;
        let elements = self.alloc_fixed_array(values)?;
        self.write_field(a, js_object::ELEMENTS_OFFSET, elements)?;
        self.write_field(a, js_array::LENGTH_OFFSET, smi_from_int(values.len() as i32))?;
        Ok(a)
    }

    pub fn alloc_function(&mut self, id: FunctionId, context: u32) -> Result<u32> {
        let f = self.alloc_js_object(self.maps.js_function, js_function::SIZE, 0)?;
        self.write_field(f, js_function::FUNCTION_ID_OFFSET, smi_from_int(id as i32))?;
        self.write_field(f, js_function::CONTEXT_OFFSET, context)?;
        Ok(f)
    }

    pub fn function_id(&self, function: u32) -> Result<FunctionId> {
        Ok(smi_to_int(self.read_field(function, js_function::FUNCTION_ID_OFFSET)?) as FunctionId)
    }

    pub fn function_context(&self, function: u32) -> Result<u32> {
        self.read_field(function, js_function::CONTEXT_OFFSET)
    }

    fn data_index(&self, object: u32) -> Result<usize> {
        if !self.is_js_object(object) {
            return Err(VmError::BadOperand(format!("{object:#010x} is not an object")));
        }
        let index = smi_to_int(self.read_field(object, js_object::PROPERTIES_OFFSET)?) as usize;
        if index >= self.objects.len() {
            return Err(VmError::BadOperand(format!("property table {index}")));
        }
        Ok(index)
    }

    pub fn prototype(&self, object: u32) -> Result<u32> {
        Ok(self.objects[self.data_index(object)?].prototype)
    }

    pub fn array_length(&self, array: u32) -> Result<usize> {
        Ok(smi_to_int(self.read_field(array, js_array::LENGTH_OFFSET)?) as usize)
    }

    pub fn array_get(&self, array: u32, index: usize) -> Result<Option<u32>> {
        if index >= self.array_length(array)? {
            return Ok(None);
        }
        let elements = self.read_field(array, js_object::ELEMENTS_OFFSET)?;
        self.fixed_array_get(elements, index).map(Some)
    }

    /// Stores element `index`, growing the backing store as needed.
    pub fn array_set(&mut self, array: u32, index: usize, value: u32) -> Result<()> {
        let elements = self.read_field(array, js_object::ELEMENTS_OFFSET)?;
        let capacity = self.fixed_array_length(elements)?;
        let elements = if index < capacity {
            elements
        } else {
            let undefined = self.undefined();
            let mut values = vec![undefined; (index + 1).max(capacity * 2)];
            for (i, slot) in values.iter_mut().enumerate().take(capacity) {
                *slot = self.fixed_array_get(elements, i)?;
            }
            let grown = self.alloc_fixed_array(&values)?;
            self.write_field(array, js_object::ELEMENTS_OFFSET, grown)?;
            grown
        };
        self.write_field(elements, fixed_array::offset_of_element(index as i32), value)?;
        if index >= self.array_length(array)? {
            self.write_field(array, js_array::LENGTH_OFFSET, smi_from_int(index as i32 + 1))?;
        }
        Ok(())
    }

    /// Own named property.
    pub fn own_property(&self, object: u32, name: &str) -> Result<Option<u32>> {
        let data = &self.objects[self.data_index(object)?];
        Ok(data
            .properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|&(_, value)| value))
    }

    /// Named property lookup along the prototype chain.
    pub fn get_property(&self, object: u32, name: &str) -> Result<Option<u32>> {
        let mut current = object;
        while current != 0 {
            if let Some(value) = self.own_property(current, name)? {
                return Ok(Some(value));
            }
            current = self.prototype(current)?;
        }
        Ok(None)
    }

    pub fn set_property(&mut self, object: u32, name: &str, value: u32) -> Result<()> {
        let index = self.data_index(object)?;
        let properties = &mut self.objects[index].properties;
        match properties.iter_mut().find(|(key, _)| key == name) {
            Some(slot) => slot.1 = value,
            None => properties.push((name.to_string(), value)),
        }
        Ok(())
    }

    /// Removes an own property; true if it existed.
    pub fn delete_property(&mut self, object: u32, name: &str) -> Result<bool> {
        let index = self.data_index(object)?;
        let properties = &mut self.objects[index].properties;
        let before = properties.len();
        properties.retain(|(key, _)| key != name);
        Ok(properties.len() != before)
    }

    /// Enumerable keys: array indices, then own and inherited names, each
    /// name once.
    pub fn property_names(&self, object: u32) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if self.is_array(object) {
            names.extend((0..self.array_length(object)?).map(|i| i.to_string()));
        }
        let mut current = object;
        while current != 0 {
            let data = &self.objects[self.data_index(current)?];
            for (key, _) in &data.properties {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
            current = data.prototype;
        }
        Ok(names)
    }

    pub fn heap_used(&self) -> u32 {
        self.memory.heap_used()
    }
}

/// Address of a field of a tagged object.
fn field(object: u32, offset: i32) -> u32 {
    untag(object).wrapping_add(offset as u32)
}

fn write_map(memory: &mut Memory, m: u32, meta: u32, ty: u32, bits: u32) -> Result<()> {
    memory.write(field(m, heap_object::MAP_OFFSET), meta)?;
    memory.write(field(m, map::INSTANCE_TYPE_OFFSET), ty)?;
    memory.write(field(m, map::BIT_FIELD_OFFSET), bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Heap {
        Heap::new(64 << 10, 4 << 10).expect("heap")
    }

    #[test]
    fn numbers_box_only_outside_the_smi_range() {
        let mut heap = heap();
        let small = heap.number(12.0).unwrap();
        assert!(is_smi(small));
        let big = heap.number(1073741824.0).unwrap();
        assert!(heap.is_heap_number(big));
        assert_eq!(heap.number_value(big), Some(1073741824.0));
        let negative_zero = heap.number(-0.0).unwrap();
        assert!(heap.is_heap_number(negative_zero));
    }

    #[test]
    fn properties_are_inherited_and_shadowed() {
        let mut heap = heap();
        let proto = heap.alloc_object(0).unwrap();
        let object = heap.alloc_object(proto).unwrap();
        let one = smi_from_int(1);
        let two = smi_from_int(2);
        heap.set_property(proto, "x", one).unwrap();
        assert_eq!(heap.get_property(object, "x").unwrap(), Some(one));
        heap.set_property(object, "x", two).unwrap();
        assert_eq!(heap.get_property(object, "x").unwrap(), Some(two));
        assert_eq!(heap.property_names(object).unwrap(), vec!["x".to_string()]);
        assert!(heap.delete_property(object, "x").unwrap());
        assert_eq!(heap.get_property(object, "x").unwrap(), Some(one));
    }

    #[test]
    fn arrays_grow_on_store_past_capacity() {
        let mut heap = heap();
        let array = heap.alloc_array(&[smi_from_int(7)]).unwrap();
        heap.array_set(array, 3, smi_from_int(9)).unwrap();
        assert_eq!(heap.array_length(array).unwrap(), 4);
        assert_eq!(heap.array_get(array, 0).unwrap(), Some(smi_from_int(7)));
        assert_eq!(heap.array_get(array, 1).unwrap(), Some(heap.undefined()));
        assert_eq!(heap.array_get(array, 3).unwrap(), Some(smi_from_int(9)));
    }

    #[test]
    fn undetectable_objects_carry_the_map_bit() {
        let mut heap = heap();
        let u = heap.alloc_undetectable().unwrap();
        let o = heap.alloc_object(0).unwrap();
        assert!(heap.is_undetectable(u));
        assert!(!heap.is_undetectable(o));
        assert!(heap.is_js_object(u));
    }
}
