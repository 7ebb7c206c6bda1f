//! Definitions to describe levels, bases, elementary operators, and tensor
//! embeddings over a composite register Hilbert space.

use std::ops::{ Deref, DerefMut };
use indexmap::IndexMap;
use itertools::Itertools;
use ndarray::{ self as nd, linalg::kron };
use num_complex::Complex64 as C64;
use num_traits::{ One, Zero };
use crate::error::{ RegisterError, RegisterResult };

/* Levels *********************************************************************/

/// Classification of a single internal level.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LevelKind {
    /// A low-lying state with no long-range interactions.
    Ground,
    /// A Rydberg state carrying an orbital angular momentum quantum number.
    Rydberg { l: u32 },
}

impl LevelKind {
    /// Return `true` if `self` is a Rydberg state.
    pub fn is_rydberg(&self) -> bool { matches!(self, Self::Rydberg { .. }) }

    /// Return the orbital angular momentum quantum number, if any.
    pub fn l(&self) -> Option<u32> {
        match *self {
            Self::Ground => None,
            Self::Rydberg { l } => Some(l),
        }
    }
}

/// A single basis level of an `Nrlevels`-level atom.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Level {
    /// Index within the atom, `0..nrlevels`.
    pub index: usize,
    pub kind: LevelKind,
}

impl Level {
    pub fn ground(index: usize) -> Self {
        Self { index, kind: LevelKind::Ground }
    }

    pub fn rydberg(index: usize, l: u32) -> Self {
        Self { index, kind: LevelKind::Rydberg { l } }
    }
}

/// An ordered collection of unique [`Level`]s with associated energies in
/// units of angular frequency.
///
/// This collection is backed by a single [`IndexMap`], which can be accessed
/// via [`AsRef`], [`AsMut`], [`Deref`] and [`DerefMut`]. Iteration order is
/// level order and is a first-class invariant: the `k`-th entry corresponds
/// to the `k`-th component of any state vector over this basis.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Basis {
    energies: IndexMap<Level, f64>,
}

impl AsRef<IndexMap<Level, f64>> for Basis {
    fn as_ref(&self) -> &IndexMap<Level, f64> { &self.energies }
}

impl AsMut<IndexMap<Level, f64>> for Basis {
    fn as_mut(&mut self) -> &mut IndexMap<Level, f64> { &mut self.energies }
}

impl Deref for Basis {
    type Target = IndexMap<Level, f64>;

    fn deref(&self) -> &Self::Target { &self.energies }
}

impl DerefMut for Basis {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.energies }
}

impl FromIterator<(Level, f64)> for Basis {
    fn from_iter<I>(iter: I) -> Self
    where I: IntoIterator<Item = (Level, f64)>
    {
        Self { energies: iter.into_iter().collect() }
    }
}

impl Basis {
    /// Create a new, empty basis.
    pub fn new() -> Self { Self::default() }

    /// Create the eigenbasis of an `nrlevels`-level atom with zero energies,
    /// tagging the levels named in `rydberg` as Rydberg states.
    ///
    /// Fails with [`RegisterError::InvalidLevelIndex`] if any Rydberg index
    /// is out of range.
    pub fn nlvl(nrlevels: usize, rydberg: &[(usize, u32)])
        -> RegisterResult<Self>
    {
        for (index, _) in rydberg.iter() {
            if *index >= nrlevels {
                return Err(RegisterError::InvalidLevelIndex {
                    index: *index, nrlevels });
            }
        }
        let basis: Self
            = (0..nrlevels)
            .map(|index| {
                let level
                    = rydberg.iter()
                    .find(|(rindex, _)| *rindex == index)
                    .map(|(_, l)| Level::rydberg(index, *l))
                    .unwrap_or_else(|| Level::ground(index));
                (level, 0.0)
            })
            .collect();
        Ok(basis)
    }

    /// Number of levels in the basis.
    pub fn num_states(&self) -> usize { self.energies.len() }

    /// Get an array representation of a particular basis level by index.
    ///
    /// The array is sized to match the number of levels currently in `self`.
    pub fn get_vector_index(&self, index: usize) -> Option<nd::Array1<C64>> {
        let n = self.energies.len();
        (index < n).then(|| basis_vector(n, index))
    }

    /// Get an array representation of a particular basis level.
    pub fn get_vector(&self, level: &Level) -> Option<nd::Array1<C64>> {
        self.energies.get_index_of(level)
            .map(|k| basis_vector(self.energies.len(), k))
    }

    /// Iterate over the local Rydberg levels with their `l` values.
    pub fn rydberg_levels(&self)
        -> impl Iterator<Item = (usize, u32)> + '_
    {
        self.energies.keys()
            .filter_map(|level| level.kind.l().map(|l| (level.index, l)))
    }
}

/* Elementary operators *******************************************************/

/// Compute the `i`-th eigenbasis ket of an `n`-level system.
pub fn basis_vector(n: usize, i: usize) -> nd::Array1<C64> {
    (0..n).map(|j| if j == i { C64::one() } else { C64::zero() }).collect()
}

/// Compute the operator `|i⟩⟨j|` of an `n`-level system.
///
/// This is a ladder operator for `i != j` and a diagonal projector for
/// `i == j`.
pub fn projector(n: usize, i: usize, j: usize) -> nd::Array2<C64> {
    let mut op: nd::Array2<C64> = nd::Array2::zeros((n, n));
    op[[i, j]] = C64::one();
    op
}

/// The `n`-level identity operator.
pub fn identity(n: usize) -> nd::Array2<C64> { nd::Array2::eye(n) }

/// Compute the outer product of two state vectors.
pub fn outer_prod(a: &nd::Array1<C64>, b: &nd::Array1<C64>)
    -> nd::Array2<C64>
{
    let na = a.len();
    let nb = b.len();
    nd::Array2::from_shape_vec(
        (na, nb),
        a.iter().cartesian_product(b)
            .map(|(ai, bj)| *ai * bj.conj())
            .collect(),
    )
    .unwrap()
}

/* Layout *********************************************************************/

/// Spatial coordinate of a single atom.
///
/// 2-D layouts are represented with `z = 0`; the distance routine is uniform
/// over both arities.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64, z: f64) -> Self { Self { x, y, z } }

    /// In-plane coordinate with `z = 0`.
    pub fn xy(x: f64, y: f64) -> Self { Self { x, y, z: 0.0 } }

    /// Euclidean distance to another coordinate.
    pub fn dist(&self, other: &Self) -> f64 {
        (
            (other.x - self.x).powi(2)
            + (other.y - self.y).powi(2)
            + (other.z - self.z).powi(2)
        )
        .sqrt()
    }
}

impl From<(f64, f64)> for Coord {
    fn from(xy: (f64, f64)) -> Self { Self::xy(xy.0, xy.1) }
}

impl From<(f64, f64, f64)> for Coord {
    fn from(xyz: (f64, f64, f64)) -> Self { Self::new(xyz.0, xyz.1, xyz.2) }
}

/* Tensor embeddings **********************************************************/

/// Embed the single-atom operator `op` at slot `slot` of a register with
/// per-atom dimensions `dims`, padding every other slot with its identity.
///
/// Atom 0 is the outermost factor of the product. Fails with
/// [`RegisterError::DimensionMismatch`] if `op` is not square with dimension
/// `dims[slot]`.
pub fn embed_at(dims: &[usize], slot: usize, op: &nd::Array2<C64>)
    -> RegisterResult<nd::Array2<C64>>
{
    if slot >= dims.len() {
        return Err(RegisterError::DimensionMismatch {
            expected: dims.len(), found: slot + 1 });
    }
    if !op.is_square() || op.shape()[0] != dims[slot] {
        return Err(RegisterError::DimensionMismatch {
            expected: dims[slot], found: op.shape()[0] });
    }
    let eyesize1: usize = dims.iter().take(slot).product();
    let eyesize2: usize = dims.iter().skip(slot + 1).product();
    Ok(kron(&kron(&nd::Array2::eye(eyesize1), op), &nd::Array2::eye(eyesize2)))
}

/// Embed one operator per `(slot, op)` pair and sum the results.
pub fn embed_sum<'a, I>(dims: &[usize], ops: I)
    -> RegisterResult<nd::Array2<C64>>
where I: IntoIterator<Item = (usize, &'a nd::Array2<C64>)>
{
    let full: usize = dims.iter().product();
    let mut acc: nd::Array2<C64> = nd::Array2::zeros((full, full));
    for (slot, op) in ops {
        acc = acc + embed_at(dims, slot, op)?;
    }
    Ok(acc)
}

/// Compute the full tensor product of one operator per register slot.
///
/// *Panics* if any operator is non-square.
pub fn multi_kron<'a, I>(ops: I) -> nd::Array2<C64>
where I: IntoIterator<Item = nd::ArrayView2<'a, C64>>
{
    let mut acc: nd::Array2<C64> = nd::Array2::eye(1);
    for op in ops {
        if !op.is_square() {
            panic!("multi_kron: encountered non-square matrix");
        }
        acc = kron(&acc, &op);
    }
    acc
}

/// Compute the full tensor product of one state vector per register slot.
pub fn kron_vec<'a, I>(kets: I) -> nd::Array1<C64>
where I: IntoIterator<Item = nd::ArrayView1<'a, C64>>
{
    let mut acc: nd::Array1<C64> = nd::Array1::from_elem(1, C64::one());
    for ket in kets {
        acc
            = nd::Array1::from_vec(
                acc.iter().cartesian_product(&ket)
                    .map(|(a, k)| *a * *k)
                    .collect()
            );
    }
    acc
}
