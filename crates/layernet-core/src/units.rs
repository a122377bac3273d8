//! Physical quantities attached to links, resources and paths.

macro_rules! unit {
    ($name: ident, $suffix: literal) => {
        #[derive(
            Debug,
            Default,
            Copy,
            Clone,
            PartialOrd,
            PartialEq,
            derive_more::Add,
            derive_more::Sub,
            derive_more::AddAssign,
            derive_more::SubAssign,
            derive_more::Sum,
            derive_more::FromStr,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(f64);

        impl $name {
            pub const ZERO: $name = Self::new(0.0);

            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            pub const fn into_f64(self) -> f64 {
                self.0
            }

            pub fn scale_by(self, factor: f64) -> Self {
                Self(self.0 * factor)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", self.0, $suffix)
            }
        }
    };
}

unit!(Km, "km");

impl Km {
    /// The time a signal needs to cover this distance at `speed`.
    pub fn propagation_delay(self, speed: KmPerSec) -> Millisecs {
        Millisecs::new(self.0 / speed.0 * 1_000.0)
    }
}

unit!(KmPerSec, "km/s");

impl KmPerSec {
    /// Propagation speed of light in standard optical fiber.
    pub const FIBER: KmPerSec = KmPerSec::new(200_000.0);
}

unit!(Millisecs, "ms");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propagation_delay_correct() {
        let delay = Km::new(400.0).propagation_delay(KmPerSec::FIBER);
        assert_eq!(delay, Millisecs::new(2.0));
    }

    #[test]
    fn units_sum() {
        let total = [Km::new(1.5), Km::new(2.5)].into_iter().sum::<Km>();
        assert_eq!(total, Km::new(4.0));
    }
}
