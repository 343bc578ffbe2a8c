// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Shared merge/split policy: given a run of existing element-bearing blocks
//! overlapping a batch of new elements, produce a replacement run of blocks that is
//! sorted, deduplicated by element id (new wins over old), and repacked so no block
//! exceeds [`super::MAX_BLOCK_SIZE`] — folding a small trailing block into the next
//! untouched block rather than leaving a near-empty block behind.

use super::MAX_BLOCK_SIZE;
use crate::error::Result;
use crate::keys::Index;

/// An element-bearing block format that the merge policy can repack.
pub trait Mergeable: Sized {
    /// The element type this block holds (a posting record, a single boolean
    /// element, a forward-index entry, ...).
    type Element: Clone;

    /// The element-id the block would be keyed by if it held only this element.
    fn element_id(element: &Self::Element) -> Index;

    /// Approximate encoded size contribution of one element, in bytes.
    fn element_len(element: &Self::Element) -> usize;

    /// Builds a block from elements already sorted ascending by [`Self::element_id`].
    fn from_elements(elements: Vec<Self::Element>) -> Result<Self>;

    /// Consumes a block, returning its elements in ascending order.
    fn into_elements(self) -> Vec<Self::Element>;
}

fn span<B: Mergeable>(elements: &[B::Element]) -> Option<(Index, Index)> {
    match (elements.first(), elements.last()) {
        (Some(first), Some(last)) => Some((B::element_id(first), B::element_id(last))),
        _ => None,
    }
}

/// Merges `new_elements` into `existing` blocks, returning the replacement blocks.
///
/// `existing` must be sorted ascending by block id (equivalently, by the id of each
/// block's last element) and `new_elements` must be sorted ascending by
/// [`Mergeable::element_id`]; ties are resolved in favor of `new_elements` (a write
/// overwrites a same-id element already on disk). Blocks whose range does not
/// intersect `new_elements`' span pass through untouched.
pub fn merge<B: Mergeable>(existing: Vec<B>, new_elements: Vec<B::Element>) -> Result<Vec<B>> {
    if new_elements.is_empty() {
        return Ok(existing);
    }
    let lo = B::element_id(&new_elements[0]);
    let hi = B::element_id(&new_elements[new_elements.len() - 1]);

    let existing_elements: Vec<Vec<B::Element>> = existing.into_iter().map(Mergeable::into_elements).collect();
    let mut touched_from = existing_elements.len();
    let mut touched_to = 0usize;
    for (i, elements) in existing_elements.iter().enumerate() {
        if let Some((first, last)) = span::<B>(elements) {
            if last >= lo && first <= hi {
                touched_from = touched_from.min(i);
                touched_to = touched_to.max(i + 1);
            }
        }
    }
    // No overlap: new_elements falls entirely in a gap between two existing blocks,
    // before the first, or past the last. The first two cases anchor on the first
    // block whose id is >= lo without folding into a neighbour — that would grow an
    // untouched block for no reason. The last case is different: there is no block
    // after the new elements to anchor on, so the last existing block's tail must
    // absorb and split them instead of leaving a stray small block beside it.
    let mut had_overlap = touched_from <= touched_to;
    if !had_overlap {
        let gap_at = existing_elements.partition_point(|e| span::<B>(e).map(|(_, last)| last < lo).unwrap_or(true));
        if gap_at == existing_elements.len() && gap_at > 0 {
            touched_from = gap_at - 1;
            touched_to = gap_at;
            had_overlap = true;
        } else {
            touched_from = gap_at;
            touched_to = gap_at;
        }
    }

    let mut combined: Vec<B::Element> = Vec::new();
    {
        let mut old_iter = existing_elements[touched_from..touched_to].iter().flatten().peekable();
        let mut new_iter = new_elements.into_iter().peekable();
        while old_iter.peek().is_some() || new_iter.peek().is_some() {
            match (old_iter.peek(), new_iter.peek()) {
                (Some(old), Some(new)) => {
                    let old_id = B::element_id(old);
                    let new_id = B::element_id(new);
                    if new_id <= old_id {
                        let taken = new_iter.next().unwrap();
                        if new_id == old_id {
                            old_iter.next();
                        }
                        combined.push(taken);
                    } else {
                        combined.push(old_iter.next().unwrap().clone());
                    }
                }
                (Some(_), None) => combined.push(old_iter.next().unwrap().clone()),
                (None, Some(_)) => combined.push(new_iter.next().unwrap()),
                (None, None) => break,
            }
        }
    }

    let mut repacked = pack::<B>(&combined);

    // Fold a small trailing block into the next untouched block so a merge that adds
    // only a handful of elements doesn't leave a near-empty block behind. Only
    // applies when an existing block was actually touched — a fresh insert into a
    // gap shouldn't grow its untouched neighbour.
    if had_overlap && touched_to < existing_elements.len() {
        if let Some(last) = repacked.last() {
            let last_len: usize = last.iter().map(B::element_len).sum();
            if last_len < MAX_BLOCK_SIZE / 2 {
                let mut tail = repacked.pop().expect("checked non-empty above");
                tail.extend(existing_elements[touched_to].iter().cloned());
                repacked.extend(pack::<B>(&tail));
                touched_to += 1;
            }
        }
    }

    let mut out = Vec::with_capacity(existing_elements.len() - (touched_to - touched_from) + repacked.len());
    for elements in &existing_elements[..touched_from] {
        out.push(B::from_elements(elements.clone())?);
    }
    for elements in repacked {
        if !elements.is_empty() {
            out.push(B::from_elements(elements)?);
        }
    }
    for elements in &existing_elements[touched_to..] {
        out.push(B::from_elements(elements.clone())?);
    }
    Ok(out)
}

/// Rebuilds a block family from scratch given the complete, authoritative element
/// set (already sorted ascending by [`Mergeable::element_id`]), discarding whatever
/// the existing blocks held rather than merging into them.
///
/// This is the "replace-all" strategy the historical `.Attic/` variants hint at
/// alongside [`merge`]'s merge-upper-bound strategy (see `DESIGN.md`'s Open
/// Questions): an operational rebuild helper for reindexing a term or document from
/// a known-complete element set, never invoked by the committed transaction path,
/// which always goes through [`merge`].
pub fn replace<B: Mergeable>(new_elements: Vec<B::Element>) -> Result<Vec<B>> {
    pack::<B>(&new_elements).into_iter().map(B::from_elements).collect()
}

/// Greedily packs elements, already sorted ascending, into groups whose summed
/// [`Mergeable::element_len`] stays at or under [`MAX_BLOCK_SIZE`].
fn pack<B: Mergeable>(elements: &[B::Element]) -> Vec<Vec<B::Element>> {
    let mut groups: Vec<Vec<B::Element>> = Vec::new();
    let mut current: Vec<B::Element> = Vec::new();
    let mut current_len = 0usize;
    for e in elements {
        let len = B::element_len(e);
        if !current.is_empty() && current_len + len > MAX_BLOCK_SIZE {
            groups.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current_len += len;
        current.push(e.clone());
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::boolean::BooleanBlock;

    #[test]
    fn merges_new_elements_into_overlapping_block() {
        let existing = vec![BooleanBlock::from_elements(&[1, 2, 3]).unwrap()];
        let merged = merge(existing, vec![2, 4]).unwrap();
        let all: Vec<Index> = merged.into_iter().flat_map(Mergeable::into_elements).collect();
        assert_eq!(all, vec![1, 2, 3, 4]);
    }

    #[test]
    fn leaves_untouched_blocks_alone() {
        let existing = vec![
            BooleanBlock::from_elements(&[1, 2]).unwrap(),
            BooleanBlock::from_elements(&[100, 101]).unwrap(),
        ];
        let merged = merge(existing, vec![50]).unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].to_elements(), vec![1, 2]);
        assert_eq!(merged[2].to_elements(), vec![100, 101]);
    }

    #[test]
    fn extends_trailing_block_past_its_id_instead_of_leaving_it_untouched() {
        let existing = vec![BooleanBlock::from_elements(&[1, 2]).unwrap()];
        let merged = merge(existing, vec![3, 4]).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].to_elements(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn new_element_overwrites_existing_at_same_id() {
        let existing = vec![BooleanBlock::from_elements(&[1, 2, 3]).unwrap()];
        let merged = merge(existing, vec![2]).unwrap();
        let all: Vec<Index> = merged.into_iter().flat_map(Mergeable::into_elements).collect();
        assert_eq!(all, vec![1, 2, 3]);
    }

    #[test]
    fn replace_ignores_existing_blocks_entirely() {
        let rebuilt: Vec<BooleanBlock> = replace(vec![5, 6, 7]).unwrap();
        let all: Vec<Index> = rebuilt.into_iter().flat_map(Mergeable::into_elements).collect();
        assert_eq!(all, vec![5, 6, 7]);
    }
}
