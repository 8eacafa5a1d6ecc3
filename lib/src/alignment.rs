/// Generate `align_down_$suffix`, `align_up_$suffix` and `is_aligned_$suffix`
/// for a given integer type.
///
/// All three treat `alignment == 0` as "no constraint". `align_up` saturates
/// instead of wrapping, so rounding the last partial page of the address space
/// up never produces a small address.
macro_rules! impl_align_fns {
    ($ty:ty, $suffix:ident) => {
        paste::paste! {
            /// Align `value` down to the nearest multiple of `alignment`.
            #[inline(always)]
            pub const fn [<align_down_ $suffix>](value: $ty, alignment: $ty) -> $ty {
                if alignment == 0 {
                    return value;
                }
                value & !(alignment - 1)
            }

            /// Align `value` up to the nearest multiple of `alignment`,
            /// saturating at the largest aligned value of the type.
            #[inline(always)]
            pub const fn [<align_up_ $suffix>](value: $ty, alignment: $ty) -> $ty {
                if alignment == 0 {
                    return value;
                }
                let adjusted = value.saturating_add(alignment - 1);
                adjusted & !(alignment - 1)
            }

            #[inline(always)]
            pub const fn [<is_aligned_ $suffix>](value: $ty, alignment: $ty) -> bool {
                alignment == 0 || value & (alignment - 1) == 0
            }
        }
    };
}

impl_align_fns!(u64, u64);
