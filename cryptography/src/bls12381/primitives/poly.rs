//! Polynomial operations over the BLS12-381 scalar field.
//!
//! Polynomials are evaluated at `x = index` where `index` is a 1-based member
//! index. Evaluating at `x = 0` would reveal the secret, so index 0 is never
//! a valid evaluation point.
//!
//! # Warning
//!
//! The security of the polynomial operations is critical for the overall
//! security of the threshold schemes. Ensure that the scalar field operations
//! are performed over the correct field and that all elements are valid.

use crate::bls12381::primitives::{
    group::{self, Element, Scalar},
    Error,
};
use beacon_utils::codec::{Error as CodecError, EncodeSize, Read, ReadExt, Write};
use bytes::{Buf, BufMut};
use rand::RngCore;
use zeroize::Zeroize;

/// Private polynomials are used to generate secret shares.
pub type Private = Poly<group::Private>;

/// Public polynomials represent commitments to secrets on a private polynomial.
pub type Public = Poly<group::Public>;

/// Signature polynomials are interpolated from at least `threshold` partial
/// signatures.
pub type Signature = Poly<group::Signature>;

/// A partial signature produced by a share.
pub type PartialSignature = Eval<group::Signature>;

/// A polynomial evaluation at a specific index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eval<C: Element> {
    pub index: u32,
    pub value: C,
}

impl<C: Element + Write> Write for Eval<C> {
    fn write(&self, buf: &mut impl BufMut) {
        self.index.write(buf);
        self.value.write(buf);
    }
}

impl<C: Element + EncodeSize> EncodeSize for Eval<C> {
    fn encode_size(&self) -> usize {
        4 + self.value.encode_size()
    }
}

impl<C: Element + Read<Cfg = ()>> Read for Eval<C> {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let index = u32::read(buf)?;
        if index == 0 {
            return Err(CodecError::Invalid("Eval", "index must be non-zero"));
        }
        let value = C::read(buf)?;
        Ok(Self { index, value })
    }
}

/// A polynomial that is using a scalar for the variable x and a generic
/// element for the coefficients.
///
/// The coefficients must be able to multiply the type of the variable,
/// which is always a scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
// Reference: https://github.com/celo-org/celo-threshold-bls-rs/blob/a714310be76620e10e8797d6637df64011926430/crates/threshold-bls/src/poly.rs#L24-L28
pub struct Poly<C>(Vec<C>);

/// Returns a new scalar polynomial of the given degree where each coefficient is
/// sampled at random from the provided RNG.
///
/// In the context of secret sharing, the threshold is the degree + 1.
pub fn new_from<R: RngCore>(degree: u32, rng: &mut R) -> Poly<Scalar> {
    // Reference: https://github.com/celo-org/celo-threshold-bls-rs/blob/a714310be76620e10e8797d6637df64011926430/crates/threshold-bls/src/poly.rs#L46-L52
    let coeffs = (0..=degree).map(|_| Scalar::rand(rng)).collect::<Vec<_>>();
    Poly::<Scalar>(coeffs)
}

impl<C> Poly<C> {
    /// Creates a new polynomial from the given coefficients.
    ///
    /// Panics if no coefficients are provided.
    pub fn from(c: Vec<C>) -> Self {
        assert!(!c.is_empty(), "polynomial must have a coefficient");
        Self(c)
    }

    /// Returns the constant term of the polynomial.
    pub fn constant(&self) -> &C {
        &self.0[0]
    }

    /// Returns the degree of the polynomial
    pub fn degree(&self) -> u32 {
        (self.0.len() - 1) as u32 // never empty, safe to subtract
    }

    /// Returns the number of required shares to reconstruct the polynomial.
    ///
    /// This will be the threshold.
    pub fn required(&self) -> u32 {
        self.0.len() as u32
    }
}

impl<C: Element> Poly<C> {
    /// Commits the scalar polynomial to the group and returns a polynomial over
    /// the group.
    ///
    /// This is done by multiplying each coefficient of the polynomial with the
    /// group's generator.
    pub fn commit(commits: &Poly<Scalar>) -> Self {
        // Reference: https://github.com/celo-org/celo-threshold-bls-rs/blob/a714310be76620e10e8797d6637df64011926430/crates/threshold-bls/src/poly.rs#L322-L340
        let commits = commits
            .0
            .iter()
            .map(|c| {
                let mut commitment = C::one();
                commitment.mul(c);
                commitment
            })
            .collect::<Vec<C>>();

        Poly::<C>::from(commits)
    }

    /// Returns a zero polynomial.
    pub fn zero() -> Self {
        Self::from(vec![C::zero()])
    }

    /// Returns the given coefficient at the requested index.
    ///
    /// It panics if the index is out of range.
    pub fn get(&self, i: u32) -> &C {
        &self.0[i as usize]
    }

    /// Performs polynomial addition in place.
    pub fn add(&mut self, other: &Self) {
        // Reference: https://github.com/celo-org/celo-threshold-bls-rs/blob/a714310be76620e10e8797d6637df64011926430/crates/threshold-bls/src/poly.rs#L87-L95

        // if we have a smaller degree we should pad with zeros
        if self.0.len() < other.0.len() {
            self.0.resize(other.0.len(), C::zero())
        }

        self.0.iter_mut().zip(&other.0).for_each(|(a, b)| a.add(b))
    }

    /// Evaluates the polynomial at `x = index`.
    ///
    /// `index` must be non-zero.
    pub fn evaluate(&self, index: u32) -> Eval<C> {
        // Reference: https://github.com/celo-org/celo-threshold-bls-rs/blob/a714310be76620e10e8797d6637df64011926430/crates/threshold-bls/src/poly.rs#L111-L129
        debug_assert_ne!(index, 0, "evaluating at zero reveals the secret");
        let xi = Scalar::from_u32(index);

        // Use Horner's method to evaluate the polynomial
        let value = self.0.iter().rev().fold(C::zero(), |mut sum, coeff| {
            sum.mul(&xi);
            sum.add(coeff);
            sum
        });
        Eval { index, value }
    }

    /// Recovers the constant term of a polynomial of degree less than `t` using at least `t` evaluations of the polynomial.
    ///
    /// This function uses Lagrange interpolation to compute the constant term (i.e., the value of the polynomial at `x=0`)
    /// given at least `t` evaluations with distinct, non-zero indices. Duplicate or zero indices are rejected.
    pub fn recover<'a, I>(t: u32, evals: I) -> Result<C, Error>
    where
        C: 'a,
        I: IntoIterator<Item = &'a Eval<C>>,
    {
        // Reference: https://github.com/celo-org/celo-threshold-bls-rs/blob/a714310be76620e10e8797d6637df64011926430/crates/threshold-bls/src/poly.rs#L131-L165

        // Check if we have at least `t` evaluations; if not, return an error
        let t = t as usize;
        let mut evals = evals.into_iter().collect::<Vec<_>>();
        if evals.len() < t {
            return Err(Error::NotEnoughPartialSignatures(t, evals.len()));
        }

        // We sort the evaluations by index to ensure that two invocations of
        // `recover` select the same evals.
        evals.sort_by_key(|e| e.index);
        if evals.first().is_some_and(|e| e.index == 0) {
            return Err(Error::InvalidEvaluation);
        }
        if evals.windows(2).any(|w| w[0].index == w[1].index) {
            return Err(Error::DuplicateEval);
        }

        // Take the first `t` evaluations and prepare them for interpolation
        let xs = evals
            .into_iter()
            .take(t)
            .map(|e| (e.index, Scalar::from_u32(e.index), &e.value))
            .collect::<Vec<_>>();

        // The constant term is `sum_{i=1 to t} yi * l_i(0)`, where `l_i(0) = product_{j != i} (xj / (xj - xi))`.
        xs.iter().try_fold(C::zero(), |mut acc, (i, xi, yi)| {
            let (mut num, den) = xs.iter().fold(
                (Scalar::one(), Scalar::one()),
                |(mut num, mut den), (j, xj, _)| {
                    if i != j {
                        num.mul(xj);

                        let mut tmp = *xj;
                        tmp.sub(xi);
                        den.mul(&tmp);
                    }
                    (num, den)
                },
            );

            let inv = den.inverse().ok_or(Error::NoInverse)?;
            num.mul(&inv);

            let mut yi_scaled = (*yi).clone();
            yi_scaled.mul(&num);
            acc.add(&yi_scaled);
            Ok(acc)
        })
    }
}

impl Zeroize for Poly<Scalar> {
    fn zeroize(&mut self) {
        self.0.iter_mut().for_each(Zeroize::zeroize);
    }
}

impl<C: Element + Write> Write for Poly<C> {
    fn write(&self, buf: &mut impl BufMut) {
        for c in &self.0 {
            c.write(buf);
        }
    }
}

impl<C: Element + EncodeSize> EncodeSize for Poly<C> {
    fn encode_size(&self) -> usize {
        self.0.iter().map(EncodeSize::encode_size).sum()
    }
}

/// Reading a polynomial requires the expected number of coefficients.
impl<C: Element + Read<Cfg = ()>> Read for Poly<C> {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, expected: &usize) -> Result<Self, CodecError> {
        if *expected == 0 {
            return Err(CodecError::InvalidLength(0));
        }
        let mut coeffs = Vec::with_capacity(*expected);
        for _ in 0..*expected {
            coeffs.push(C::read(buf)?);
        }
        Ok(Self(coeffs))
    }
}

/// Returns the public key of the polynomial (constant term).
pub fn public(public: &Public) -> &group::Public {
    public.constant()
}
