//! Permutations of atoms induced by symmetry operations.

use std::fmt;

use anyhow::{self, ensure, format_err};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};


/// A structure to manage permutation actions of a finite set, such as the mapping of atoms onto
/// their symmetry-equivalent partners.
#[derive(Builder, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct Permutation {
    /// The rank of the permutation, *i.e.* the number of elements in the finite set on which the
    /// permutation acts.
    rank: usize,

    /// If the permutation is to act on an ordered sequence of $`n`$ integers, $`0, 1, \ldots, n`$
    /// where $`n`$ is [`Self::rank`], then this gives the result of the action.
    image: Vec<usize>,
}

impl PermutationBuilder {
    fn validate(&self) -> Result<(), String> {
        let rank = self.rank.ok_or("The rank for this permutation has not been set.")?;
        let image = self
            .image
            .as_ref()
            .ok_or("The image for this permutation has not been set.")?;
        if image.len() != rank {
            return Err(format!(
                "The permutation image `{image:?}` does not contain {rank} elements."
            ));
        }
        let mut seen = vec![false; rank];
        for &i in image.iter() {
            if i >= rank || seen[i] {
                return Err(format!(
                    "The image `{image:?}` does not describe a bijection on {rank} elements."
                ));
            }
            seen[i] = true;
        }
        Ok(())
    }
}

impl Permutation {
    /// Returns a builder to construct a new permutation.
    #[must_use]
    pub fn builder() -> PermutationBuilder {
        PermutationBuilder::default()
    }

    /// Constructs a permutation from its image.
    ///
    /// # Errors
    ///
    /// Errors if `image` is not a bijection on $`\{0, \ldots, n-1\}`$.
    pub fn from_image(image: &[usize]) -> Result<Self, anyhow::Error> {
        Self::builder()
            .rank(image.len())
            .image(image.to_vec())
            .build()
            .map_err(|err| format_err!(err))
    }

    /// The number of elements on which the permutation acts.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// The image of the permutation.
    #[must_use]
    pub fn image(&self) -> &Vec<usize> {
        &self.image
    }

    /// Returns the image of a single element.
    ///
    /// # Errors
    ///
    /// Errors if `i` is out of range.
    pub fn image_of(&self, i: usize) -> Result<usize, anyhow::Error> {
        ensure!(
            i < self.rank,
            "Element {i} is out of range for a permutation of rank {}.",
            self.rank
        );
        Ok(self.image[i])
    }

    /// Obtains the cycle representation of the permutation, with longer cycles first.
    #[must_use]
    pub fn cycles(&self) -> Vec<Vec<usize>> {
        let mut visited = vec![false; self.rank];
        let mut cycles: Vec<Vec<usize>> = Vec::with_capacity(self.rank);
        for start in 0..self.rank {
            if visited[start] {
                continue;
            }
            let mut cycle = vec![start];
            visited[start] = true;
            let mut idx = self.image[start];
            while idx != start {
                visited[idx] = true;
                cycle.push(idx);
                idx = self.image[idx];
            }
            cycles.push(cycle);
        }
        cycles.sort_by_key(|cycle| (!cycle.len(), cycle.clone()));
        cycles
    }

    /// Returns `true` if this permutation is the identity permutation for this rank.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.image.iter().enumerate().all(|(i, &j)| i == j)
    }
}

impl fmt::Display for Permutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cycles = self
            .cycles()
            .iter()
            .filter(|cycle| cycle.len() > 1)
            .map(|cycle| {
                format!(
                    "({})",
                    cycle
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(" ")
                )
            })
            .collect::<Vec<_>>();
        if cycles.is_empty() {
            write!(f, "()")
        } else {
            write!(f, "{}", cycles.concat())
        }
    }
}
