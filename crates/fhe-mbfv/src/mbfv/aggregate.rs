//! Combination of protocol shares.
//!
//! Every share is a vector of ring elements, and combining two shares adds
//! them coefficient-wise. Ring addition being associative and commutative, the
//! result of an aggregation does not depend on the order or grouping of the
//! shares, which lets an aggregator fold shares as they arrive or reduce them
//! in parallel.

use rayon::prelude::*;

use crate::{Error, Result};

/// A share that can be combined with the shares of other parties.
pub trait ShareCombiner: Sized + Clone {
    /// Fold `other` into `self`.
    ///
    /// The shares are validated before any coefficient is modified; on error,
    /// `self` is left untouched.
    fn combine_assign(&mut self, other: &Self) -> Result<()>;

    /// Combine two shares into a new one.
    fn combine(a: &Self, b: &Self) -> Result<Self> {
        let mut dst = a.clone();
        dst.combine_assign(b)?;
        Ok(dst)
    }
}

/// Sequentially fold all the shares.
pub fn aggregate_all<'a, S, I>(shares: I) -> Result<S>
where
    S: ShareCombiner + 'a,
    I: IntoIterator<Item = &'a S>,
{
    let mut shares = shares.into_iter();
    let mut acc = shares.next().ok_or(Error::TooFewValues(0, 1))?.clone();
    for share in shares {
        acc.combine_assign(share)?;
    }
    Ok(acc)
}

/// Fold all the shares with a parallel reduction tree.
pub fn aggregate_tree<S>(shares: &[S]) -> Result<S>
where
    S: ShareCombiner + Send + Sync,
{
    shares
        .par_iter()
        .cloned()
        .map(Ok::<S, Error>)
        .try_reduce_with(|mut a, b| {
            a.combine_assign(&b)?;
            Ok(a)
        })
        .unwrap_or(Err(Error::TooFewValues(0, 1)))
}

/// Aggregation of an iterator of shares.
pub trait AggregateIter<'a, S: ShareCombiner + 'a>: Iterator<Item = &'a S> + Sized {
    /// Fold all the shares of the iterator.
    fn aggregate(self) -> Result<S> {
        aggregate_all(self)
    }
}

impl<'a, S: ShareCombiner + 'a, I: Iterator<Item = &'a S>> AggregateIter<'a, S> for I {}
