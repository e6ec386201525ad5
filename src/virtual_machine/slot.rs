//! Tagged value model.
//!
//! Every value on an operand stack or in a variable table is a [`Slot`]
//! behind a shared-ownership handle ([`SlotRef`]). Cloning a handle is the
//! increment of the slot's reference count, dropping it the decrement;
//! storage is reclaimed when the last handle goes away.
//!
//! Scalars live in a [`Cell`] so that opcodes which mutate a value through
//! an aliased handle (`UNARY_OP` increment/decrement, `STORE_SUBSCR*`) can
//! do so without exclusive access. Arrays hold one shared slot per cell:
//! `BINARY_SUBSCR` hands out a live handle to the cell itself, and later
//! in-place stores must stay visible through that handle.

use crate::virtual_machine::errors::VMError;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Shared owning handle to a slot.
pub type SlotRef = Rc<Slot>;

/// Scalar payload of a slot, tag included.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Scalar {
    Void,
    Int(i64),
    Float(f64),
    Char(u8),
}

/// Element type of an array. Arrays of arrays or of void do not exist.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ElemType {
    Int,
    Float,
    Char,
}

impl ElemType {
    /// Decodes a `BUILD_ARR` operand (0 int, 1 float, 2 char).
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ElemType::Int),
            1 => Some(ElemType::Float),
            2 => Some(ElemType::Char),
            _ => None,
        }
    }

    /// The zero value cells start out with.
    fn zero(self) -> Scalar {
        match self {
            ElemType::Int => Scalar::Int(0),
            ElemType::Float => Scalar::Float(0.0),
            ElemType::Char => Scalar::Char(0),
        }
    }
}

/// A runtime value: a mutable scalar or an array object.
#[derive(Debug)]
pub enum Slot {
    Scalar(Cell<Scalar>),
    Array(ArrayObj),
}

impl Slot {
    /// Creates a fresh scalar slot.
    pub fn scalar(value: Scalar) -> SlotRef {
        Rc::new(Slot::Scalar(Cell::new(value)))
    }

    /// Creates a fresh void slot.
    pub fn void() -> SlotRef {
        Slot::scalar(Scalar::Void)
    }

    /// Creates a zero-initialized array slot.
    pub fn array(len: usize, elem: ElemType) -> SlotRef {
        Rc::new(Slot::Array(ArrayObj::new(len, elem)))
    }

    /// Returns the scalar payload, or `None` for arrays.
    pub fn get(&self) -> Option<Scalar> {
        match self {
            Slot::Scalar(cell) => Some(cell.get()),
            Slot::Array(_) => None,
        }
    }

    /// Overwrites the scalar payload through a shared handle.
    ///
    /// Arrays are left untouched; callers that can meet an array are
    /// responsible for rejecting it first.
    pub fn set(&self, value: Scalar) {
        if let Slot::Scalar(cell) = self {
            cell.set(value);
        }
    }

    /// Returns the integer payload, or `None` for anything else.
    pub fn as_int(&self) -> Option<i64> {
        match self.get() {
            Some(Scalar::Int(v)) => Some(v),
            _ => None,
        }
    }

    /// `JMP_TRUE`/`JMP_FALSE` condition: a nonzero int.
    pub fn truthy(&self) -> bool {
        matches!(self.get(), Some(Scalar::Int(v)) if v != 0)
    }

    /// Returns the array object, or `None` for scalars.
    pub fn as_array(&self) -> Option<&ArrayObj> {
        match self {
            Slot::Array(array) => Some(array),
            Slot::Scalar(_) => None,
        }
    }
}

impl fmt::Display for Slot {
    /// The textual form used by `PRINTK` and the tracer.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Scalar(cell) => match cell.get() {
                Scalar::Void => write!(f, "(null)"),
                Scalar::Int(v) => write!(f, "{v}(int)"),
                Scalar::Float(v) => write!(f, "{v}(float)"),
                Scalar::Char(v) => write!(f, "{}(char)", v as char),
            },
            Slot::Array(array) => write!(f, "array[{}]", array.len()),
        }
    }
}

/// Fixed-size array of scalar cells with a fixed element type.
#[derive(Debug)]
pub struct ArrayObj {
    elem: ElemType,
    cells: Vec<SlotRef>,
}

impl ArrayObj {
    fn new(len: usize, elem: ElemType) -> Self {
        let cells = (0..len).map(|_| Slot::scalar(elem.zero())).collect();
        Self { elem, cells }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when the array has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Element type of every cell.
    pub fn elem(&self) -> ElemType {
        self.elem
    }

    /// Returns a new handle to the cell at `index`.
    pub fn cell(&self, index: i64) -> Result<SlotRef, VMError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.cells.get(i))
            .cloned()
            .ok_or(VMError::SubscriptOutOfBounds {
                index,
                size: self.cells.len(),
            })
    }

    /// Writes a scalar payload into the cell at `index`.
    ///
    /// Only a payload whose tag matches the element type is written; a
    /// mismatched tag leaves the cell unchanged (legacy behavior). The cell
    /// handle itself is never replaced, so handles loaned out by
    /// `BINARY_SUBSCR` observe the store.
    pub fn store(&self, index: i64, value: Scalar) -> Result<(), VMError> {
        let cell = usize::try_from(index)
            .ok()
            .and_then(|i| self.cells.get(i))
            .ok_or(VMError::SubscriptOutOfBounds {
                index,
                size: self.cells.len(),
            })?;
        match (self.elem, value) {
            (ElemType::Int, Scalar::Int(_))
            | (ElemType::Float, Scalar::Float(_))
            | (ElemType::Char, Scalar::Char(_)) => cell.set(value),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(Slot::scalar(Scalar::Int(5)).to_string(), "5(int)");
        assert_eq!(Slot::scalar(Scalar::Int(-3)).to_string(), "-3(int)");
        assert_eq!(Slot::scalar(Scalar::Float(3.0)).to_string(), "3(float)");
        assert_eq!(Slot::scalar(Scalar::Float(2.5)).to_string(), "2.5(float)");
        assert_eq!(Slot::scalar(Scalar::Char(b'a')).to_string(), "a(char)");
        assert_eq!(Slot::void().to_string(), "(null)");
        assert_eq!(Slot::array(3, ElemType::Int).to_string(), "array[3]");
    }

    #[test]
    fn arrays_start_zeroed() {
        let slot = Slot::array(2, ElemType::Float);
        let array = slot.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array.cell(0).unwrap().get(), Some(Scalar::Float(0.0)));
        assert_eq!(array.cell(1).unwrap().get(), Some(Scalar::Float(0.0)));
    }

    #[test]
    fn store_visible_through_loaned_cell_handle() {
        let slot = Slot::array(1, ElemType::Int);
        let array = slot.as_array().unwrap();
        let loaned = array.cell(0).unwrap();
        array.store(0, Scalar::Int(42)).unwrap();
        assert_eq!(loaned.get(), Some(Scalar::Int(42)));
    }

    #[test]
    fn store_with_mismatched_tag_is_ignored() {
        let slot = Slot::array(1, ElemType::Int);
        let array = slot.as_array().unwrap();
        array.store(0, Scalar::Float(1.5)).unwrap();
        assert_eq!(array.cell(0).unwrap().get(), Some(Scalar::Int(0)));
    }

    #[test]
    fn subscript_out_of_bounds() {
        let slot = Slot::array(2, ElemType::Char);
        let array = slot.as_array().unwrap();
        assert!(matches!(
            array.cell(2),
            Err(VMError::SubscriptOutOfBounds { index: 2, size: 2 })
        ));
        assert!(matches!(
            array.store(-1, Scalar::Char(b'x')),
            Err(VMError::SubscriptOutOfBounds { index: -1, size: 2 })
        ));
    }

    #[test]
    fn handle_clone_tracks_reference_count() {
        let slot = Slot::scalar(Scalar::Int(7));
        assert_eq!(Rc::strong_count(&slot), 1);
        let alias = Rc::clone(&slot);
        assert_eq!(Rc::strong_count(&slot), 2);
        drop(alias);
        assert_eq!(Rc::strong_count(&slot), 1);
    }
}
