//! Operator constructor registry.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::op::OpKind;
use crate::operator::Operator;

/// Builds an operator instance from its kind (parameters included).
pub type OpConstructor = Box<dyn Fn(&OpKind) -> Result<Box<dyn Operator>>>;

/// Registry of operator constructors keyed by [`OpKind::name`].
#[derive(Default)]
pub struct OpRegistry {
    ctors: BTreeMap<String, OpConstructor>,
}

impl fmt::Debug for OpRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpRegistry")
            .field("ops", &self.ctors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OpRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor, replacing any previous one under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn(&OpKind) -> Result<Box<dyn Operator>> + 'static,
    {
        let name = name.into();
        if self.ctors.insert(name.clone(), Box::new(ctor)).is_some() {
            log::debug!("operator `{name}` re-registered");
        }
    }

    /// Instantiates the operator for `kind`.
    pub fn create(&self, kind: &OpKind) -> Result<Box<dyn Operator>> {
        let name = kind.name();
        let ctor = self
            .ctors
            .get(name)
            .ok_or_else(|| Error::UnknownOp(name.to_owned()))?;
        ctor(kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(name)
    }

    /// Lists registered operator names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.ctors.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Context;
    use crate::tensor::TensorId;

    #[derive(Debug)]
    struct Nop;

    impl Operator for Nop {
        fn name(&self) -> &str {
            "NOP"
        }

        fn check(
            &self,
            _cx: &Context<'_>,
            _inputs: &[Option<TensorId>],
            _outputs: &[Option<TensorId>],
        ) -> Result<()> {
            Ok(())
        }

        fn setup(
            &mut self,
            _cx: &mut Context<'_>,
            _inputs: &mut [Option<TensorId>],
            _outputs: &[Option<TensorId>],
        ) -> Result<()> {
            Ok(())
        }

        fn compute(
            &mut self,
            _cx: &mut Context<'_>,
            _inputs: &[Option<TensorId>],
            _outputs: &[Option<TensorId>],
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn create_registered_op() {
        let mut reg = OpRegistry::new();
        reg.register("NOP", |_| Ok(Box::new(Nop) as Box<dyn Operator>));
        assert!(reg.contains("NOP"));
        let op = reg.create(&OpKind::Custom { name: "NOP".into() }).unwrap();
        assert_eq!(op.name(), "NOP");
    }

    #[test]
    fn unknown_op() {
        let reg = OpRegistry::new();
        assert!(matches!(
            reg.create(&OpKind::Add),
            Err(Error::UnknownOp(name)) if name == "ADD"
        ));
    }

    #[test]
    fn names_are_sorted() {
        let mut reg = OpRegistry::new();
        reg.register("ZED", |_| Ok(Box::new(Nop) as Box<dyn Operator>));
        reg.register("ALPHA", |_| Ok(Box::new(Nop) as Box<dyn Operator>));
        assert_eq!(reg.names(), vec!["ALPHA", "ZED"]);
    }
}
