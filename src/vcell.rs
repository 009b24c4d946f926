//! Volatile cell that conforms to the RAL's register API

use core::cell::UnsafeCell;

/// A memory-mapped register, or a stand-in for one.
///
/// `read` and `write` are volatile, which is all that the `ral-registers`
/// macros need from a register.
#[repr(transparent)]
pub struct VCell<T>(UnsafeCell<T>);

impl<T> VCell<T> {
    #[cfg(test)]
    pub const fn new(val: T) -> Self {
        VCell(UnsafeCell::new(val))
    }
}

impl<T: Copy> VCell<T> {
    pub fn read(&self) -> T {
        // Safety: the cell is only ever accessed by value, so there are no
        // outstanding references into it.
        unsafe { self.0.get().read_volatile() }
    }
    pub fn write(&self, val: T) {
        unsafe { self.0.get().write_volatile(val) }
    }
}
