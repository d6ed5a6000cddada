//! Signature Registry
//!
//! Ordered signature declarations, and the table of bound functions produced
//! from them in one eager pass.

use std::collections::HashMap;

use super::synth::{BoundFunction, Synthesizer};
use super::types::{Arg, FfiSignature, Value};
use super::{BindError, CallError};

/// Signatures in declaration order, one per symbol
#[derive(Debug, Clone, Default)]
pub struct SignatureRegistry {
    signatures: Vec<FfiSignature>,
    index: HashMap<String, usize>,
}

impl SignatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signature; each symbol may be declared once
    pub fn register(&mut self, signature: FfiSignature) -> Result<(), BindError> {
        if self.index.contains_key(&signature.name) {
            return Err(BindError::DuplicateSymbol(signature.name));
        }
        self.index.insert(signature.name.clone(), self.signatures.len());
        self.signatures.push(signature);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FfiSignature> {
        self.index.get(name).map(|&i| &self.signatures[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FfiSignature> {
        self.signatures.iter()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Bind every signature; the first failure aborts the whole table
    pub fn bind(&self, synth: &Synthesizer) -> Result<Bindings, BindError> {
        let mut bindings = Bindings::default();
        for signature in &self.signatures {
            let function = synth.synthesize(signature.clone())?;
            bindings
                .index
                .insert(signature.name.clone(), bindings.functions.len());
            bindings.functions.push(function);
        }
        log::debug!("bound {} functions", bindings.len());
        Ok(bindings)
    }
}

/// Bound functions by name, in declaration order
#[derive(Debug, Default)]
pub struct Bindings {
    functions: Vec<BoundFunction>,
    index: HashMap<String, usize>,
}

impl Bindings {
    pub fn get(&self, name: &str) -> Option<&BoundFunction> {
        self.index.get(name).map(|&i| &self.functions[i])
    }

    /// Call a bound function by name
    pub fn call(&self, name: &str, args: &[Arg<'_>]) -> Result<Value, CallError> {
        self.get(name)
            .ok_or_else(|| CallError::UnknownFunction(name.to_string()))?
            .call(args)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundFunction> {
        self.functions.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(BoundFunction::name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
