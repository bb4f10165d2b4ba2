//! Atom operands.
//!
//! An [`Operand`] wraps a parameter reference with an access semantic and an
//! optional lane mask. On `In` operands the mask is a read swizzle; on `Out`
//! and `InOut` operands it is a write mask. An operand may be subscripted by
//! an `At` operand (`bones[int(indices.x)]`).

use bitflags::bitflags;

use super::parameter::{ParameterPtr, same_parameter};

bitflags! {
    /// Lane selection of an operand. Empty means "whole parameter".
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct OperandMask: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const Z = 1 << 2;
        const W = 1 << 3;
        const XY = Self::X.bits() | Self::Y.bits();
        const XYZ = Self::X.bits() | Self::Y.bits() | Self::Z.bits();
        const XYZW = Self::XYZ.bits() | Self::W.bits();
    }
}

impl OperandMask {
    /// Mask selecting `count` consecutive lanes starting at `first`.
    #[must_use]
    pub fn from_lanes(first: u32, count: u32) -> Self {
        let mut bits = 0u8;
        for lane in first..(first + count).min(4) {
            bits |= 1 << lane;
        }
        Self::from_bits_truncate(bits)
    }

    /// Mask selecting the single lane `lane`.
    #[must_use]
    pub fn lane(lane: u32) -> Self {
        Self::from_lanes(lane, 1)
    }

    /// Selected lane indices in ascending order.
    pub fn lanes(self) -> impl Iterator<Item = u32> {
        (0..4u32).filter(move |l| self.bits() & (1 << l) != 0)
    }

    /// Number of selected lanes; 0 for an empty mask.
    #[must_use]
    pub fn lane_count(self) -> u32 {
        self.bits().count_ones()
    }

    /// Index of the highest selected lane.
    #[must_use]
    pub fn highest_lane(self) -> Option<u32> {
        self.lanes().last()
    }

    /// Swizzle suffix (`.xyz`), empty when the mask is empty.
    #[must_use]
    pub fn swizzle(self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut s = String::with_capacity(5);
        s.push('.');
        for lane in self.lanes() {
            s.push(['x', 'y', 'z', 'w'][lane as usize]);
        }
        s
    }

    /// Moves every selected lane up by `offset`.
    ///
    /// Returns `None` when a lane would leave the 4-lane register.
    #[must_use]
    pub fn shifted(self, offset: u32) -> Option<Self> {
        let mut bits = 0u8;
        for lane in self.lanes() {
            let target = lane + offset;
            if target > 3 {
                return None;
            }
            bits |= 1 << target;
        }
        Some(Self::from_bits_truncate(bits))
    }
}

/// Access semantic of an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandSemantic {
    In,
    Out,
    InOut,
    /// Subscript of the enclosing operand.
    At,
}

/// Parameter reference inside an atom.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub(crate) param: ParameterPtr,
    pub(crate) semantic: OperandSemantic,
    pub(crate) mask: OperandMask,
    pub(crate) index: Option<Box<Operand>>,
}

impl Operand {
    #[must_use]
    pub fn new(param: &ParameterPtr, semantic: OperandSemantic) -> Self {
        Self {
            param: ParameterPtr::clone(param),
            semantic,
            mask: OperandMask::empty(),
            index: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn input(param: &ParameterPtr) -> Self {
        Self::new(param, OperandSemantic::In)
    }

    #[inline]
    #[must_use]
    pub fn output(param: &ParameterPtr) -> Self {
        Self::new(param, OperandSemantic::Out)
    }

    #[inline]
    #[must_use]
    pub fn inout(param: &ParameterPtr) -> Self {
        Self::new(param, OperandSemantic::InOut)
    }

    #[inline]
    #[must_use]
    pub fn at(param: &ParameterPtr) -> Self {
        Self::new(param, OperandSemantic::At)
    }

    /// Applies a swizzle / write mask.
    #[must_use]
    pub fn with_mask(mut self, mask: OperandMask) -> Self {
        self.mask = mask;
        self
    }

    /// Subscripts this operand with `index` (turned into an `At` operand).
    #[must_use]
    pub fn indexed_by(mut self, mut index: Operand) -> Self {
        index.semantic = OperandSemantic::At;
        self.index = Some(Box::new(index));
        self
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn parameter(&self) -> &ParameterPtr {
        &self.param
    }

    #[inline]
    #[must_use]
    pub fn semantic(&self) -> OperandSemantic {
        self.semantic
    }

    #[inline]
    #[must_use]
    pub fn mask(&self) -> OperandMask {
        self.mask
    }

    #[inline]
    #[must_use]
    pub fn index(&self) -> Option<&Operand> {
        self.index.as_deref()
    }

    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self.semantic, OperandSemantic::Out | OperandSemantic::InOut)
    }

    #[must_use]
    pub fn refers_to(&self, param: &ParameterPtr) -> bool {
        same_parameter(&self.param, param)
            || self.index.as_ref().is_some_and(|i| i.refers_to(param))
    }

    /// Lanes this operand touches, resolved against the parameter's width.
    #[must_use]
    pub fn effective_mask(&self) -> OperandMask {
        if self.mask.is_empty() {
            OperandMask::from_lanes(0, self.param.ty().lane_count())
        } else {
            self.mask
        }
    }

    /// Visits this operand and its subscript.
    pub fn visit(&self, f: &mut impl FnMut(&Operand)) {
        f(self);
        if let Some(index) = &self.index {
            index.visit(f);
        }
    }

    /// Mutable variant of [`Operand::visit`].
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut Operand)) {
        f(self);
        if let Some(index) = &mut self.index {
            index.visit_mut(f);
        }
    }
}
