use serde::{Deserialize, Serialize};

use crate::core::types::{BatchId, PartId};

/// The discrete unit of material moving through a production line.
/// Created by a source, destroyed when a sink collects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub quality: f64,
    pub value: f64,
    /// Set while the part travels as a member of a batch.
    pub batch: Option<BatchId>,
}

/// Value and quality given to every part a source produces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartTemplate {
    pub value: f64,
    pub quality: f64,
}

impl Default for PartTemplate {
    fn default() -> Self {
        PartTemplate {
            value: 0.0,
            quality: 1.0,
        }
    }
}

/// A grouping of parts that moves through the handshake as one unit. It
/// is an abstraction for moving parts together, not a physical object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub parts: Vec<Part>,
}

/// What a single handshake moves: either one part or one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Part(Part),
    Batch(Batch),
}

impl Item {
    /// Number of parts carried, counting batch members individually.
    pub fn part_count(&self) -> u64 {
        match self {
            Item::Part(_) => 1,
            Item::Batch(batch) => batch.parts.len() as u64,
        }
    }

    /// Summed value of the carried parts.
    pub fn value(&self) -> f64 {
        match self {
            Item::Part(part) => part.value,
            Item::Batch(batch) => batch.parts.iter().map(|p| p.value).sum(),
        }
    }

    /// Quality as recorded in datapoints: a batch has no inherent
    /// quality of its own.
    pub fn quality(&self) -> f64 {
        match self {
            Item::Part(part) => part.quality,
            Item::Batch(_) => 0.0,
        }
    }

    /// Visit every carried part mutably.
    pub fn for_each_part(&mut self, mut f: impl FnMut(&mut Part)) {
        match self {
            Item::Part(part) => f(part),
            Item::Batch(batch) => batch.parts.iter_mut().for_each(f),
        }
    }

    /// Consume the item, yielding its individual parts with any batch
    /// membership removed.
    pub fn into_parts(self) -> Vec<Part> {
        match self {
            Item::Part(mut part) => {
                part.batch = None;
                vec![part]
            }
            Item::Batch(batch) => batch
                .parts
                .into_iter()
                .map(|mut part| {
                    part.batch = None;
                    part
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(id: u64, value: f64) -> Part {
        Part {
            id: PartId(id),
            quality: 1.0,
            value,
            batch: None,
        }
    }

    #[test]
    fn batch_counts_and_values_sum_members() {
        let item = Item::Batch(Batch {
            id: BatchId(1),
            parts: vec![part(1, 2.0), part(2, 3.0)],
        });
        assert_eq!(item.part_count(), 2);
        assert_eq!(item.value(), 5.0);
        assert_eq!(item.quality(), 0.0);
    }

    #[test]
    fn into_parts_strips_batch_membership() {
        let mut member = part(1, 0.0);
        member.batch = Some(BatchId(9));
        let item = Item::Batch(Batch {
            id: BatchId(9),
            parts: vec![member],
        });
        let parts = item.into_parts();
        assert_eq!(parts.len(), 1);
        assert!(parts[0].batch.is_none());
    }
}
