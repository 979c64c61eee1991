//! Auto-dereferencing namespace
//!
//! An [`AutoDeref`] is constructed once per evaluation step of a dynamics
//! model. Entries holding a [`RefTensor`] are expanded the first time they are
//! read and the expanded tensor is kept until the entry is overwritten, so
//! reading a shared parameter several times within one step gathers it once.
//! Values may change between steps; never keep a namespace across steps.

use super::RefTensor;
use crate::error::{Error, Result};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::ops::Index;

/// A namespace entry
#[derive(Debug, Clone)]
pub enum Value<B: Backend, const D: usize = 1> {
    Scalar(f64),
    Tensor(Tensor<B, D>),
    Ref(RefTensor<B, D>),
    Namespace(AutoDeref<B, D>),
    Sequence(Vec<Value<B, D>>),
}

impl<B: Backend, const D: usize> Value<B, D> {
    fn kind(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::Tensor(_) => "tensor",
            Value::Ref(_) => "reference tensor",
            Value::Namespace(_) => "namespace",
            Value::Sequence(_) => "sequence",
        }
    }

    /// Recursive copy; nested namespaces come back with empty caches
    pub fn deep_clone(&self) -> Self {
        match self {
            Value::Scalar(x) => Value::Scalar(*x),
            Value::Tensor(t) => Value::Tensor(t.clone()),
            Value::Ref(r) => Value::Ref(r.clone()),
            Value::Namespace(ns) => Value::Namespace(ns.deep_clone()),
            Value::Sequence(seq) => Value::Sequence(seq.iter().map(Value::deep_clone).collect()),
        }
    }

    /// Recursive copy with gradient tracking severed on every tensor
    pub fn detach(&self) -> Self {
        match self {
            Value::Scalar(x) => Value::Scalar(*x),
            Value::Tensor(t) => Value::Tensor(t.clone().detach()),
            Value::Ref(r) => Value::Ref(r.detach()),
            Value::Namespace(ns) => Value::Namespace(ns.detach()),
            Value::Sequence(seq) => Value::Sequence(seq.iter().map(Value::detach).collect()),
        }
    }
}

impl<B: Backend, const D: usize> From<f64> for Value<B, D> {
    fn from(x: f64) -> Self {
        Value::Scalar(x)
    }
}

impl<B: Backend, const D: usize> From<Tensor<B, D>> for Value<B, D> {
    fn from(t: Tensor<B, D>) -> Self {
        Value::Tensor(t)
    }
}

impl<B: Backend, const D: usize> From<RefTensor<B, D>> for Value<B, D> {
    fn from(r: RefTensor<B, D>) -> Self {
        Value::Ref(r)
    }
}

impl<B: Backend, const D: usize> From<AutoDeref<B, D>> for Value<B, D> {
    fn from(ns: AutoDeref<B, D>) -> Self {
        Value::Namespace(ns)
    }
}

impl<B: Backend, const D: usize> From<Vec<Value<B, D>>> for Value<B, D> {
    fn from(seq: Vec<Value<B, D>>) -> Self {
        Value::Sequence(seq)
    }
}

/// A resolved read from the namespace; reference tensors arrive dereferenced
pub enum Field<'a, B: Backend, const D: usize = 1> {
    Scalar(f64),
    Tensor(&'a Tensor<B, D>),
    Namespace(&'a AutoDeref<B, D>),
    Sequence(&'a [Value<B, D>]),
}

struct Slot<B: Backend, const D: usize> {
    value: Value<B, D>,
    resolved: OnceCell<Tensor<B, D>>,
}

impl<B: Backend, const D: usize> Slot<B, D> {
    fn new(value: Value<B, D>) -> Self {
        Self {
            value,
            resolved: OnceCell::new(),
        }
    }
}

/// Insertion-ordered namespace that dereferences [`RefTensor`] entries on read.
///
/// `get(key)` on a reference entry gathers once and returns the same cached
/// tensor on every later read. The cache entry is dropped by [`set`](Self::set)
/// on that key, by [`clear_cache`](Self::clear_cache) and is never carried into
/// [`deep_clone`](Self::deep_clone) or [`detach`](Self::detach) results.
pub struct AutoDeref<B: Backend, const D: usize = 1> {
    order: Vec<String>,
    slots: HashMap<String, Slot<B, D>>,
}

impl<B: Backend, const D: usize> Default for AutoDeref<B, D> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            slots: HashMap::new(),
        }
    }
}

impl<B: Backend, const D: usize> AutoDeref<B, D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set`](Self::set)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value<B, D>>) -> Self {
        self.set(key, value);
        self
    }

    /// Store `value` under `key`, dropping any cached dereference of the old value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value<B, D>>) {
        let key = key.into();
        if !self.slots.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.slots.insert(key, Slot::new(value.into()));
    }

    /// Resolve `key`, dereferencing and caching reference tensors
    pub fn get(&self, key: &str) -> Result<Field<'_, B, D>> {
        let slot = self.slot(key)?;
        Ok(match &slot.value {
            Value::Scalar(x) => Field::Scalar(*x),
            Value::Tensor(t) => Field::Tensor(t),
            Value::Ref(r) => Field::Tensor(slot.resolved.get_or_init(|| r.deref())),
            Value::Namespace(ns) => Field::Namespace(ns),
            Value::Sequence(seq) => Field::Sequence(seq),
        })
    }

    /// Resolve `key` as a tensor
    pub fn tensor(&self, key: &str) -> Result<&Tensor<B, D>> {
        match self.get(key)? {
            Field::Tensor(t) => Ok(t),
            _ => Err(self.mismatch(key, "tensor")),
        }
    }

    pub fn scalar(&self, key: &str) -> Result<f64> {
        match self.get(key)? {
            Field::Scalar(x) => Ok(x),
            _ => Err(self.mismatch(key, "scalar")),
        }
    }

    pub fn namespace(&self, key: &str) -> Result<&AutoDeref<B, D>> {
        match self.get(key)? {
            Field::Namespace(ns) => Ok(ns),
            _ => Err(self.mismatch(key, "namespace")),
        }
    }

    pub fn sequence(&self, key: &str) -> Result<&[Value<B, D>]> {
        match self.get(key)? {
            Field::Sequence(seq) => Ok(seq),
            _ => Err(self.mismatch(key, "sequence")),
        }
    }

    /// The stored value without dereferencing, e.g. the [`RefTensor`] itself
    pub fn get_raw(&self, key: &str) -> Result<&Value<B, D>> {
        Ok(&self.slot(key)?.value)
    }

    /// Whether a dereferenced tensor is currently cached for `key`
    pub fn is_cached(&self, key: &str) -> bool {
        self.slots
            .get(key)
            .map(|slot| slot.resolved.get().is_some())
            .unwrap_or(false)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Raw entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value<B, D>)> {
        self.order
            .iter()
            .map(move |k| (k.as_str(), &self.slots[k].value))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drop every cached dereference and return a deep clone of the namespace
    pub fn clear_cache(&mut self) -> Self {
        for slot in self.slots.values_mut() {
            slot.resolved.take();
        }
        self.deep_clone()
    }

    /// Recursive copy of every value with an empty cache
    pub fn deep_clone(&self) -> Self {
        self.map_values(Value::deep_clone)
    }

    /// Recursive copy with gradient tracking severed, empty cache
    pub fn detach(&self) -> Self {
        self.map_values(Value::detach)
    }

    fn map_values(&self, f: impl Fn(&Value<B, D>) -> Value<B, D>) -> Self {
        let slots = self
            .order
            .iter()
            .map(|k| (k.clone(), Slot::new(f(&self.slots[k].value))))
            .collect();
        Self {
            order: self.order.clone(),
            slots,
        }
    }

    fn slot(&self, key: &str) -> Result<&Slot<B, D>> {
        self.slots
            .get(key)
            .ok_or_else(|| Error::MissingKey(key.to_string()))
    }

    fn mismatch(&self, key: &str, expected: &'static str) -> Error {
        Error::TypeMismatch {
            key: key.to_string(),
            expected,
        }
    }
}

impl<B: Backend, const D: usize> Clone for AutoDeref<B, D> {
    fn clone(&self) -> Self {
        self.deep_clone()
    }
}

/// Key-style access, identical to [`AutoDeref::tensor`] including caching.
///
/// Panics if the key is missing or not tensor-valued.
impl<B: Backend, const D: usize> Index<&str> for AutoDeref<B, D> {
    type Output = Tensor<B, D>;

    fn index(&self, key: &str) -> &Self::Output {
        match self.tensor(key) {
            Ok(t) => t,
            Err(err) => panic!("{}", err),
        }
    }
}

impl<B: Backend, const D: usize> fmt::Debug for AutoDeref<B, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AutoDeref(")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match value {
                Value::Scalar(x) => write!(f, "{}={}", key, x)?,
                Value::Tensor(t) => write!(f, "{}=Tensor{:?}", key, t.dims())?,
                Value::Ref(r) => write!(f, "{}=Ref({}->{})", key, r.n_groups(), r.n_items())?,
                Value::Namespace(ns) => write!(f, "{}={:?}", key, ns)?,
                Value::Sequence(seq) => write!(
                    f,
                    "{}=[{}]",
                    key,
                    seq.iter().map(Value::kind).collect::<Vec<_>>().join(", ")
                )?,
            }
        }
        write!(f, ")")
    }
}
