use crate::error::PldaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The coordinate spaces an observation can be expressed in, in chain order:
/// raw data, decorrelated data, full latent space, latent model subspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Space {
    D,
    X,
    U,
    #[serde(rename = "U_model")]
    UModel,
}

impl Space {
    pub const CHAIN: [Space; 4] = [Space::D, Space::X, Space::U, Space::UModel];

    /// Position of the space along the chain.
    pub fn position(self) -> usize {
        match self {
            Self::D => 0,
            Self::X => 1,
            Self::U => 2,
            Self::UModel => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::D => "D",
            Self::X => "X",
            Self::U => "U",
            Self::UModel => "U_model",
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Space {
    type Err = PldaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::CHAIN
            .into_iter()
            .find(|space| space.name() == s)
            .ok_or_else(|| {
                PldaError::Configuration(format!(
                    "unknown space '{s}', expected one of D, X, U, U_model"
                ))
            })
    }
}

/// One of the six elementary mappings between neighbouring spaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    DToX,
    XToU,
    UToUModel,
    UModelToU,
    UToX,
    XToD,
}

impl Step {
    pub fn source(self) -> Space {
        match self {
            Self::DToX => Space::D,
            Self::XToU | Self::XToD => Space::X,
            Self::UToUModel | Self::UToX => Space::U,
            Self::UModelToU => Space::UModel,
        }
    }

    pub fn target(self) -> Space {
        match self {
            Self::DToX | Self::UToX => Space::X,
            Self::XToU | Self::UModelToU => Space::U,
            Self::UToUModel => Space::UModel,
            Self::XToD => Space::D,
        }
    }

    /// Step leaving chain position `from` towards the model subspace.
    fn inward(from: usize) -> Self {
        match from {
            0 => Self::DToX,
            1 => Self::XToU,
            _ => Self::UToUModel,
        }
    }

    /// Step leaving chain position `from` towards the data space.
    fn outward(from: usize) -> Self {
        match from {
            3 => Self::UModelToU,
            2 => Self::UToX,
            _ => Self::XToD,
        }
    }
}

/// The ordered elementary steps leading from `from` to `to`.
///
/// The chain is linear, so there is exactly one path between two spaces;
/// walking from a space to itself is the empty path.
pub fn space_walk(from: Space, to: Space) -> Vec<Step> {
    let (start, end) = (from.position(), to.position());
    if start <= end {
        (start..end).map(Step::inward).collect()
    } else {
        (end + 1..=start).rev().map(Step::outward).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_is_contiguous_for_every_pair() {
        for from in Space::CHAIN {
            for to in Space::CHAIN {
                let steps = space_walk(from, to);
                assert_eq!(
                    steps.len(),
                    from.position().abs_diff(to.position()),
                    "{from} -> {to}"
                );
                let mut current = from;
                for step in steps {
                    assert_eq!(step.source(), current);
                    assert_eq!(
                        step.source().position().abs_diff(step.target().position()),
                        1
                    );
                    current = step.target();
                }
                assert_eq!(current, to);
            }
        }
    }

    #[test]
    fn walk_matches_expected_order() {
        assert_eq!(
            space_walk(Space::D, Space::UModel),
            vec![Step::DToX, Step::XToU, Step::UToUModel]
        );
        assert_eq!(
            space_walk(Space::UModel, Space::X),
            vec![Step::UModelToU, Step::UToX]
        );
        assert!(space_walk(Space::U, Space::U).is_empty());
    }

    #[test]
    fn names_parse_back() {
        for space in Space::CHAIN {
            assert_eq!(space.name().parse::<Space>().unwrap(), space);
        }
        assert!(matches!(
            "V".parse::<Space>(),
            Err(PldaError::Configuration(_))
        ));
        assert!("u_model".parse::<Space>().is_err());
    }
}
