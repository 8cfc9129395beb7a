use crate::group::MemberIndex;
use beacon_utils::{hash, modulo};

/// Decides the order in which members may submit a result.
pub trait SubmissionPolicy: Send + Sync {
    /// Returns the position of `member` in the submission order over
    /// `submitters`, or `None` if it may not submit.
    ///
    /// Every member must derive the same order from the same inputs.
    fn position(&self, seed: &[u8], submitters: &[MemberIndex], member: MemberIndex)
        -> Option<usize>;
}

/// Rotates through the submitters starting at `SHA-256(seed) mod |submitters|`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Rotation;

impl SubmissionPolicy for Rotation {
    fn position(
        &self,
        seed: &[u8],
        submitters: &[MemberIndex],
        member: MemberIndex,
    ) -> Option<usize> {
        let at = submitters.iter().position(|m| *m == member)?;
        let n = submitters.len();
        let first = modulo(&hash(seed), n as u64) as usize;
        Some((at + n - first) % n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(raw: &[u32]) -> Vec<MemberIndex> {
        raw.iter().copied().map(MemberIndex::new).collect()
    }

    #[test]
    fn test_rotation_is_a_permutation() {
        let submitters = indices(&[1, 2, 4, 5]);
        for seed in [b"a".as_slice(), b"b", b"seed"] {
            let mut positions = submitters
                .iter()
                .map(|m| Rotation.position(seed, &submitters, *m).unwrap())
                .collect::<Vec<_>>();

            // Same inputs, same order
            let again = submitters
                .iter()
                .map(|m| Rotation.position(seed, &submitters, *m).unwrap())
                .collect::<Vec<_>>();
            assert_eq!(positions, again);

            positions.sort();
            assert_eq!(positions, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn test_rotation_starts_at_seed() {
        let submitters = indices(&[1, 2, 3]);
        let first = modulo(&hash(b"seed"), 3) as usize;
        assert_eq!(
            Rotation.position(b"seed", &submitters, submitters[first]),
            Some(0)
        );
    }

    #[test]
    fn test_excluded_member() {
        let submitters = indices(&[1, 2, 4]);
        assert_eq!(Rotation.position(b"seed", &submitters, MemberIndex::new(3)), None);
        assert_eq!(Rotation.position(b"seed", &[], MemberIndex::new(1)), None);
    }
}
