//! Explicit (anchor, positive, negative) grouping of training clips.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use tracing::debug;

use crate::error::{Error, Result};
use crate::labels::Label;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triplet {
    pub anchor: PathBuf,
    pub positive: PathBuf,
    pub negative: PathBuf,
}

/// Sample `count` triplets from labeled clips.
///
/// Anchor classes are visited round-robin in a freshly shuffled order each
/// round, so every class with at least two clips anchors about equally
/// often. The positive is a different clip of the anchor's class, the
/// negative a clip of any other class.
pub fn build_triplets<R: Rng + ?Sized>(clips: &[PathBuf], count: usize, rng: &mut R) -> Result<Vec<Triplet>> {
    let mut by_label: BTreeMap<Label, Vec<&PathBuf>> = BTreeMap::new();
    for clip in clips {
        by_label.entry(Label::from_path(clip)?).or_default().push(clip);
    }

    if by_label.len() < 2 {
        return Err(Error::NotEnoughTriplets(format!(
            "need clips from at least two categories, found {}",
            by_label.len()
        )));
    }

    let anchor_classes: Vec<Label> = by_label
        .iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(label, _)| *label)
        .collect();
    if anchor_classes.is_empty() {
        return Err(Error::NotEnoughTriplets(
            "no category has two clips to form an anchor/positive pair".into(),
        ));
    }

    let mut order = anchor_classes.clone();
    let mut triplets = Vec::with_capacity(count);
    for i in 0..count {
        if i % order.len() == 0 {
            order.shuffle(rng);
        }
        let anchor_label = order[i % order.len()];

        let members = &by_label[&anchor_label];
        let pair: Vec<&&PathBuf> = members.choose_multiple(rng, 2).collect();

        let negatives: Vec<&Vec<&PathBuf>> = by_label
            .iter()
            .filter(|(label, _)| **label != anchor_label)
            .map(|(_, members)| members)
            .collect();
        let negative = negatives
            .choose(rng)
            .and_then(|members| members.choose(rng))
            .ok_or_else(|| Error::NotEnoughTriplets("no negative class available".into()))?;

        triplets.push(Triplet {
            anchor: (*pair[0]).clone(),
            positive: (*pair[1]).clone(),
            negative: (*negative).clone(),
        });
    }

    debug!(
        triplets = triplets.len(),
        anchor_classes = anchor_classes.len(),
        "built triplets"
    );
    Ok(triplets)
}

/// Batch order: `a0, p0, n0, a1, p1, n1, ...`
pub fn flatten_triplets(triplets: &[Triplet]) -> Vec<PathBuf> {
    triplets
        .iter()
        .flat_map(|t| [t.anchor.clone(), t.positive.clone(), t.negative.clone()])
        .collect()
}
