//! Host implementations of the runtime entry points.

use plinth_core::isa::{ConstValue, Constant, Root};
use plinth_core::layout::{context, smi_to_int};
use plinth_core::runtime::RuntimeFunction;
use tracing::{debug, trace};

use crate::error::VmError;
use crate::machine::{Flow, Interrupt, Vm};
use crate::value::array_index;

impl Vm {
    /// Pops `argc` stack arguments and runs `function`, returning the
    /// value for `v0`.
    pub(crate) fn call_runtime(&mut self, function: RuntimeFunction, argc: u8) -> Flow<u32> {
        *self.stats.runtime_calls.entry(function).or_default() += 1;
        if let Some(arity) = function.arity() {
            if arity != argc {
                return Err(VmError::BadOperand(format!(
                    "%{function} takes {arity} arguments, called with {argc}"
                ))
                .into());
            }
        }
        let args = self.pop_arguments(argc as usize)?;
        trace!(%function, argc, "runtime call");
        let arg = |i: usize| args.get(i).copied().unwrap_or(0);
        let heap = &mut self.heap;

        let result = match function {
            RuntimeFunction::Throw | RuntimeFunction::ReThrow => {
                return Err(Interrupt::Throw(arg(0)))
            }
            RuntimeFunction::NewContext => {
                let closure = arg(0);
                let id = heap.function_id(closure)?;
                let slots = self
                    .functions
                    .get(id as usize)
                    .map_or(context::MIN_CONTEXT_SLOTS as u32, |f| f.heap_slots);
                let previous = self.heap.function_context(closure)?;
                self.heap
                    .alloc_context(slots as usize, closure, previous, self.global_object)?
            }
            RuntimeFunction::NewClosure => {
                let id = smi_to_int(arg(1)) as u32;
                if self.functions.get(id as usize).is_none() {
                    return Err(VmError::UnknownFunction(id).into());
                }
                heap.alloc_function(id, arg(0))?
            }
            RuntimeFunction::ToBool => {
                let truth = heap.to_boolean(arg(0));
                heap.boolean(truth)
            }
            RuntimeFunction::ToNumber => {
                if heap.is_number(arg(0)) {
                    arg(0)
                } else {
                    let n = heap.to_number(arg(0));
                    heap.number(n)?
                }
            }
            RuntimeFunction::Typeof => {
                let name = heap.typeof_name(arg(0));
                heap.alloc_string(name)?
            }
            RuntimeFunction::DeleteProperty => self.delete_property(arg(0), arg(1))?,
            RuntimeFunction::HasProperty => self.has_property(arg(1), arg(0))?,
            RuntimeFunction::GetPropertyNames => self.property_names(arg(0))?,
            RuntimeFunction::ForInFilter => {
                let (object, key) = (arg(0), arg(1));
                if self.has_key(object, key)? {
                    key
                } else {
                    self.heap.undefined()
                }
            }
            RuntimeFunction::CreateObjectLiteral => self.object_literal(arg(0))?,
            RuntimeFunction::CreateArrayLiteral => self.array_literal(arg(0))?,
            RuntimeFunction::DeclareGlobal => {
                let name = heap.string_value(arg(0))?.to_string();
                let value = arg(1);
                let global = self.global_object;
                if value != self.heap.root(Root::TheHole) {
                    self.heap.set_property(global, &name, value)?;
                } else if self.heap.own_property(global, &name)?.is_none() {
                    let undefined = self.heap.undefined();
                    self.heap.set_property(global, &name, undefined)?;
                }
                self.heap.undefined()
            }
            RuntimeFunction::ClassOf => match heap.class_of(arg(0)) {
                Some(class) => heap.alloc_string(class)?,
                None => heap.null(),
            },
            RuntimeFunction::StackGuard => heap.undefined(),
            RuntimeFunction::Print => {
                let line = args
                    .iter()
                    .map(|&w| self.heap.to_display_string(w))
                    .collect::<Vec<_>>()
                    .join(" ");
                debug!(%line, "print");
                self.output.push(line);
                self.heap.undefined()
            }
            RuntimeFunction::Abort => {
                let message = args
                    .first()
                    .map_or_else(|| "abort".to_string(), |&w| self.heap.to_display_string(w));
                return Err(VmError::Trap(message).into());
            }
        };
        Ok(result)
    }

    fn delete_property(&mut self, object: u32, key: u32) -> Flow<u32> {
        if self.heap.is_js_object(object) {
            let name = self.key_name(key);
            match array_index(&name).filter(|_| self.heap.is_array(object)) {
                Some(index) if index < self.heap.array_length(object)? => {
                    let hole = self.heap.root(Root::TheHole);
                    self.heap.array_set(object, index, hole)?;
                }
                Some(_) => {}
                None => {
                    self.heap.delete_property(object, &name)?;
                }
            }
        }
        Ok(self.heap.boolean(true))
    }

    /// `key in object`.
    fn has_property(&mut self, object: u32, key: u32) -> Flow<u32> {
        if !self.heap.is_js_object(object) {
            return Err(self.throw_error("TypeError", "cannot use 'in' on a non-object"));
        }
        let found = self.has_key(object, key)?;
        Ok(self.heap.boolean(found))
    }

    fn has_key(&mut self, object: u32, key: u32) -> Flow<bool> {
        if !self.heap.is_js_object(object) {
            return Ok(false);
        }
        let name = self.key_name(key);
        if self.heap.is_array(object) && name == "length" {
            return Ok(true);
        }
        Ok(self.load_named(object, &name)?.is_some())
    }

    /// Enumerable keys as a fixed array of strings.
    fn property_names(&mut self, object: u32) -> Flow<u32> {
        let names = if self.heap.is_js_object(object) {
            self.heap.property_names(object)?
        } else {
            Vec::new()
        };
        let mut keys = Vec::with_capacity(names.len());
        for name in &names {
            keys.push(self.heap.alloc_string(name)?);
        }
        Ok(self.heap.alloc_fixed_array(&keys)?)
    }

    fn boilerplate(&self, index: u32) -> Flow<Constant> {
        self.boilerplates
            .get(smi_to_int(index) as usize)
            .cloned()
            .ok_or_else(|| VmError::BadOperand(format!("boilerplate {}", smi_to_int(index))).into())
    }

    fn literal_word(&mut self, value: &ConstValue) -> Flow<u32> {
        let heap = &mut self.heap;
        Ok(match value {
            ConstValue::Smi(v) => heap.number(f64::from(*v))?,
            ConstValue::Number(n) => heap.alloc_heap_number(*n)?,
            ConstValue::String(s) => heap.alloc_string(s)?,
            ConstValue::True => heap.boolean(true),
            ConstValue::False => heap.boolean(false),
            ConstValue::Null => heap.null(),
            ConstValue::Undefined => heap.undefined(),
            ConstValue::Hole => heap.root(Root::TheHole),
        })
    }

    /// A fresh object with the literal's properties. Computed properties
    /// start out `undefined` until the generated code stores them.
    fn object_literal(&mut self, index: u32) -> Flow<u32> {
        let Constant::ObjectBoilerplate(properties) = self.boilerplate(index)? else {
            return Err(VmError::BadOperand("expected an object boilerplate".into()).into());
        };
        let object = self.heap.alloc_object(0)?;
        for (name, value) in &properties {
            let word = match value {
                ConstValue::Hole => self.heap.undefined(),
                literal => self.literal_word(literal)?,
            };
            self.heap.set_property(object, name, word)?;
        }
        Ok(object)
    }

    /// A fresh array with one backing slot per element. Computed elements
    /// hold the hole until the generated code stores them.
    fn array_literal(&mut self, index: u32) -> Flow<u32> {
        let Constant::ArrayBoilerplate(values) = self.boilerplate(index)? else {
            return Err(VmError::BadOperand("expected an array boilerplate".into()).into());
        };
        let mut words = Vec::with_capacity(values.len());
        for value in &values {
            words.push(self.literal_word(value)?);
        }
        Ok(self.heap.alloc_array(&words)?)
    }
}
