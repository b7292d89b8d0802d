//! The tensor table: every tensor of a graph, declared or materialized.
//!
//! Storage follows an explicit two-state lifecycle. A tensor starts out
//! `Declared` (no backing buffer) and becomes `Materialized` when
//! [`TensorTable::materialize`] runs, which needs a resolved shape.
//! Non-virtual tensors with a known shape are materialized at creation;
//! virtual ones wait for the compute walk. A view created by
//! [`TensorTable::reshape_view`] shares the buffer of its base tensor.

use crate::arena::{Arena, Handle};
use crate::error::{Error, Result};
use crate::types::TensorAttr;

/// Handle of a tensor in a [`TensorTable`].
pub type TensorId = Handle<Tensor>;

#[derive(Clone, Debug)]
enum Storage {
    Declared,
    Owned(Vec<f32>),
    Alias(TensorId),
}

/// A tensor: attributes plus (possibly deferred) storage.
#[derive(Clone, Debug)]
pub struct Tensor {
    attr: TensorAttr,
    storage: Storage,
    fill: f32,
    name: Option<String>,
}

impl Tensor {
    pub fn attr(&self) -> &TensorAttr {
        &self.attr
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns `true` if this tensor aliases another tensor's storage.
    pub fn is_view(&self) -> bool {
        matches!(self.storage, Storage::Alias(_))
    }
}

/// Owner of all tensors of one graph.
#[derive(Clone, Debug, Default)]
pub struct TensorTable {
    arena: Arena<Tensor>,
}

impl TensorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tensor. Non-virtual tensors with a known shape get
    /// zero-filled storage right away.
    pub fn create(&mut self, attr: TensorAttr) -> TensorId {
        self.create_with_default(attr, 0.0)
    }

    /// Creates a tensor whose storage is filled with `fill` when it is
    /// materialized.
    pub fn create_with_default(&mut self, attr: TensorAttr, fill: f32) -> TensorId {
        let storage = match (&attr.shape, attr.is_virtual) {
            (Some(shape), false) => Storage::Owned(vec![fill; shape.iter().product()]),
            _ => Storage::Declared,
        };
        self.arena.append(Tensor {
            attr,
            storage,
            fill,
            name: None,
        })
    }

    /// Creates a metadata-only reshape of `src`: the new tensor shares the
    /// storage of `src` and no data is moved.
    pub fn reshape_view(&mut self, src: TensorId, shape: &[usize]) -> Result<TensorId> {
        let base = self.get(src)?;
        let count: usize = shape.iter().product();
        if let Some(expected) = base.attr.element_count()
            && expected != count
        {
            return Err(Error::ShapeMismatch {
                op: "reshape_view".into(),
                detail: format!("{expected} elements cannot be viewed as {shape:?}"),
            });
        }
        let attr = TensorAttr {
            shape: Some(shape.to_vec()),
            ..base.attr.clone()
        };
        Ok(self.arena.append(Tensor {
            attr,
            storage: Storage::Alias(src),
            fill: 0.0,
            name: None,
        }))
    }

    /// Releases a tensor. Views of it become stale.
    pub fn release(&mut self, id: TensorId) -> Result<()> {
        self.arena
            .remove(id)
            .map(|_| ())
            .ok_or(Error::StaleTensor(id))
    }

    pub fn contains(&self, id: TensorId) -> bool {
        self.arena.contains(id)
    }

    /// Number of tensors not yet released.
    pub fn live_count(&self) -> usize {
        self.arena.live_count()
    }

    pub fn get(&self, id: TensorId) -> Result<&Tensor> {
        self.arena.try_get(id).ok_or(Error::StaleTensor(id))
    }

    pub fn attr(&self, id: TensorId) -> Result<&TensorAttr> {
        Ok(&self.get(id)?.attr)
    }

    pub fn attr_mut(&mut self, id: TensorId) -> Result<&mut TensorAttr> {
        self.arena
            .try_get_mut(id)
            .map(|t| &mut t.attr)
            .ok_or(Error::StaleTensor(id))
    }

    /// The resolved shape of a tensor.
    pub fn shape(&self, id: TensorId) -> Result<&[usize]> {
        self.attr(id)?
            .shape
            .as_deref()
            .ok_or(Error::UnresolvedShape(id))
    }

    /// Resolves the shape of a tensor. A non-virtual tensor that was still
    /// declared gets its storage now.
    pub fn set_shape(&mut self, id: TensorId, shape: &[usize]) -> Result<()> {
        let tensor = self.arena.try_get_mut(id).ok_or(Error::StaleTensor(id))?;
        tensor.attr.shape = Some(shape.to_vec());
        if !tensor.attr.is_virtual && matches!(tensor.storage, Storage::Declared) {
            self.materialize(id)?;
        }
        Ok(())
    }

    pub fn set_name(&mut self, id: TensorId, name: impl Into<String>) -> Result<()> {
        let tensor = self.arena.try_get_mut(id).ok_or(Error::StaleTensor(id))?;
        tensor.name = Some(name.into());
        Ok(())
    }

    /// Returns `true` once the tensor has backing storage (views count as
    /// backed by their base).
    pub fn is_materialized(&self, id: TensorId) -> Result<bool> {
        Ok(!matches!(self.get(id)?.storage, Storage::Declared))
    }

    /// Attaches storage to a declared tensor. Idempotent.
    pub fn materialize(&mut self, id: TensorId) -> Result<()> {
        let tensor = self.arena.try_get_mut(id).ok_or(Error::StaleTensor(id))?;
        if !matches!(tensor.storage, Storage::Declared) {
            return Ok(());
        }
        let count = tensor
            .attr
            .element_count()
            .ok_or(Error::UnresolvedShape(id))?;
        tensor.storage = Storage::Owned(vec![tensor.fill; count]);
        Ok(())
    }

    /// Turns a still-declared tensor into a view of `target`.
    ///
    /// Returns `false` (and changes nothing) if `id` already has storage or
    /// the element counts differ.
    pub fn alias(&mut self, id: TensorId, target: TensorId) -> Result<bool> {
        let target_count = self.attr(target)?.element_count();
        let tensor = self.arena.try_get_mut(id).ok_or(Error::StaleTensor(id))?;
        if !matches!(tensor.storage, Storage::Declared)
            || target_count.is_none()
            || tensor.attr.element_count() != target_count
        {
            return Ok(false);
        }
        tensor.storage = Storage::Alias(target);
        Ok(true)
    }

    /// Follows view links down to the tensor that owns the storage.
    fn root(&self, mut id: TensorId) -> Result<TensorId> {
        loop {
            match self.get(id)?.storage {
                Storage::Alias(base) => id = base,
                _ => return Ok(id),
            }
        }
    }

    /// Returns `true` if both tensors resolve to the same storage.
    pub fn same_storage(&self, a: TensorId, b: TensorId) -> Result<bool> {
        Ok(self.root(a)? == self.root(b)?)
    }

    /// Reads the elements of a tensor (through views).
    pub fn data(&self, id: TensorId) -> Result<&[f32]> {
        let root = self.root(id)?;
        match &self.get(root)?.storage {
            Storage::Owned(data) => Ok(data),
            _ => Err(Error::NotMaterialized(id)),
        }
    }

    /// Replaces the elements of a tensor (through views), materializing it
    /// if needed.
    pub fn write(&mut self, id: TensorId, data: Vec<f32>) -> Result<()> {
        let root = self.root(id)?;
        let tensor = self
            .arena
            .try_get_mut(root)
            .ok_or(Error::StaleTensor(root))?;
        let expected = tensor
            .attr
            .element_count()
            .ok_or(Error::UnresolvedShape(root))?;
        if expected != data.len() {
            return Err(Error::DataLength {
                id,
                expected,
                found: data.len(),
            });
        }
        tensor.storage = Storage::Owned(data);
        Ok(())
    }

    /// Sets every element of a tensor to `value`.
    pub fn fill(&mut self, id: TensorId, value: f32) -> Result<()> {
        let root = self.root(id)?;
        let count = self
            .attr(root)?
            .element_count()
            .ok_or(Error::UnresolvedShape(root))?;
        self.write(root, vec![value; count])
    }

    /// Iterates over live tensors.
    pub fn iter(&self) -> impl Iterator<Item = (TensorId, &Tensor)> {
        self.arena.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DType;

    #[test]
    fn non_virtual_with_shape_is_materialized_at_creation() {
        let mut table = TensorTable::new();
        let t = table.create_with_default(TensorAttr::constant(&[3], DType::F32), 1.5);
        assert!(table.is_materialized(t).unwrap());
        assert_eq!(table.data(t).unwrap(), &[1.5, 1.5, 1.5]);
    }

    #[test]
    fn virtual_tensor_materializes_lazily() {
        let mut table = TensorTable::new();
        let t = table.create(TensorAttr::internal(&DType::F32, true));
        assert!(!table.is_materialized(t).unwrap());
        assert!(matches!(table.materialize(t), Err(Error::UnresolvedShape(_))));
        table.set_shape(t, &[2, 2]).unwrap();
        assert!(!table.is_materialized(t).unwrap());
        table.materialize(t).unwrap();
        table.materialize(t).unwrap();
        assert_eq!(table.data(t).unwrap().len(), 4);
    }

    #[test]
    fn auto_non_virtual_materializes_when_shape_resolves() {
        let mut table = TensorTable::new();
        let t = table.create(TensorAttr::auto(DType::F32));
        assert!(!table.is_materialized(t).unwrap());
        table.set_shape(t, &[5]).unwrap();
        assert!(table.is_materialized(t).unwrap());
    }

    #[test]
    fn reshape_view_shares_storage() {
        let mut table = TensorTable::new();
        let base = table.create(TensorAttr::new(&[4, 2], DType::F32));
        table
            .write(base, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0])
            .unwrap();
        let view = table.reshape_view(base, &[2, 2, 2]).unwrap();
        assert!(table.same_storage(view, base).unwrap());
        assert_eq!(table.shape(view).unwrap(), &[2, 2, 2]);
        assert_eq!(table.data(view).unwrap()[5], 5.0);

        table.fill(view, 9.0).unwrap();
        assert_eq!(table.data(base).unwrap(), &[9.0; 8]);

        // Releasing the view leaves the base intact.
        table.release(view).unwrap();
        assert!(table.contains(base));
    }

    #[test]
    fn reshape_view_rejects_count_mismatch() {
        let mut table = TensorTable::new();
        let base = table.create(TensorAttr::new(&[4, 2], DType::F32));
        assert!(table.reshape_view(base, &[3, 3]).is_err());
    }

    #[test]
    fn release_is_tracked() {
        let mut table = TensorTable::new();
        let a = table.create(TensorAttr::new(&[1], DType::F32));
        let _b = table.create(TensorAttr::new(&[1], DType::F32));
        assert_eq!(table.live_count(), 2);
        table.release(a).unwrap();
        assert_eq!(table.live_count(), 1);
        assert!(matches!(table.release(a), Err(Error::StaleTensor(_))));
        assert!(matches!(table.data(a), Err(Error::StaleTensor(_))));
    }

    #[test]
    fn write_checks_length() {
        let mut table = TensorTable::new();
        let t = table.create(TensorAttr::new(&[2], DType::F32));
        assert!(matches!(
            table.write(t, vec![1.0]),
            Err(Error::DataLength { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn alias_only_applies_to_declared_tensors() {
        let mut table = TensorTable::new();
        let src = table.create(TensorAttr::new(&[6], DType::F32));
        let out = table.create(TensorAttr::internal(&DType::F32, true));
        table.set_shape(out, &[2, 3]).unwrap();
        assert!(table.alias(out, src).unwrap());
        assert!(table.get(out).unwrap().is_view());
        assert!(!table.alias(out, src).unwrap());

        let owned = table.create(TensorAttr::new(&[6], DType::F32));
        assert!(!table.alias(owned, src).unwrap());
    }
}
