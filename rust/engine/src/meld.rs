//! Meld validation: decides whether a pile of cards can be split into the
//! trios and runs a round demands.
//!
//! Shared rules for every meld:
//! - a **trio** holds at least 3 cards whose naturals all share one rank;
//! - a **run** holds at least 4 cards of one suit on consecutive ranks,
//!   Ace low (`A,2,...,K`), no wraparound;
//! - jokers substitute for any missing card and each joker is spent exactly
//!   once. A meld still needs one natural card to fix its rank or suit.
//!
//! Two partitioning strategies are offered. [`MeldStrategy::Greedy`] forms
//! every free trio first, pads pairs and then single cards with jokers until
//! the trio quota is met, then scans what is left for runs. It is deterministic and cheap but can
//! reject a hand that only works under a different joker allocation, e.g. a
//! pair the greedy pass pads into a trio while the joker was needed to bridge
//! a run. [`MeldStrategy::Exhaustive`] backtracks over minimal trios and runs
//! and finds a partition whenever one exists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cards::{all_suits, Card, Rank, Suit};
use crate::errors::GameError;
use crate::rules::RoundRequirement;

pub const MIN_TRIO_LEN: usize = 3;
pub const MIN_RUN_LEN: usize = 4;

const RANKS: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeldStrategy {
    #[default]
    Greedy,
    Exhaustive,
}

impl MeldStrategy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "greedy" => Some(Self::Greedy),
            "exhaustive" | "backtracking" => Some(Self::Exhaustive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeldKind {
    Trio,
    Run,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meld {
    pub kind: MeldKind,
    pub cards: Vec<Card>,
}

impl Meld {
    pub fn is_valid(&self) -> bool {
        match self.kind {
            MeldKind::Trio => is_valid_trio(&self.cards),
            MeldKind::Run => is_valid_run(&self.cards),
        }
    }
}

/// A split of some cards into melds plus whatever did not fit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub melds: Vec<Meld>,
    pub leftover: Vec<Card>,
}

impl Partition {
    pub fn trios(&self) -> usize {
        self.count(MeldKind::Trio)
    }

    pub fn runs(&self) -> usize {
        self.count(MeldKind::Run)
    }

    fn count(&self, kind: MeldKind) -> usize {
        self.melds.iter().filter(|m| m.kind == kind).count()
    }

    pub fn meets(&self, requirement: RoundRequirement) -> bool {
        self.trios() >= requirement.trios as usize && self.runs() >= requirement.runs as usize
    }

    pub fn card_count(&self) -> usize {
        self.melds.iter().map(|m| m.cards.len()).sum::<usize>() + self.leftover.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeldVerdict {
    pub requirement: RoundRequirement,
    pub satisfied: bool,
    pub partition: Partition,
}

pub fn is_valid_trio(cards: &[Card]) -> bool {
    let (naturals, _) = split_jokers(cards);
    cards.len() >= MIN_TRIO_LEN
        && !naturals.is_empty()
        && naturals.windows(2).all(|w| w[0].rank == w[1].rank)
}

pub fn is_valid_run(cards: &[Card]) -> bool {
    let (naturals, jokers) = split_jokers(cards);
    if cards.len() < MIN_RUN_LEN || cards.len() > RANKS {
        return false;
    }
    if naturals.windows(2).any(|w| w[0].suit != w[1].suit) {
        return false;
    }
    let mut indices: Vec<usize> = naturals.iter().filter_map(|c| c.rank.run_index()).collect();
    indices.sort_unstable();
    if indices.windows(2).any(|w| w[0] == w[1]) {
        return false;
    }
    match (indices.first(), indices.last()) {
        (Some(lo), Some(hi)) => {
            let gaps = hi - lo + 1 - indices.len();
            gaps <= jokers
        }
        _ => false,
    }
}

/// Runs the validator over `cards` against `requirement`.
///
/// # Errors
///
/// [`GameError::InvalidCard`] if any card breaks the joker suit/rank invariant.
/// An empty or short input is not an error, it is simply not satisfied
/// (unless the requirement itself is empty).
pub fn validate(
    cards: &[Card],
    requirement: RoundRequirement,
    strategy: MeldStrategy,
) -> Result<MeldVerdict, GameError> {
    for card in cards {
        Card::new(card.suit, card.rank)?;
    }
    let greedy = greedy_partition(cards, requirement);
    let (partition, satisfied) = match strategy {
        MeldStrategy::Greedy => {
            let satisfied = greedy.meets(requirement);
            (greedy, satisfied)
        }
        MeldStrategy::Exhaustive => match exhaustive_partition(cards, requirement) {
            Some(found) => (found, true),
            None => (greedy, false),
        },
    };
    Ok(MeldVerdict {
        requirement,
        satisfied,
        partition,
    })
}

pub fn can_satisfy(
    cards: &[Card],
    requirement: RoundRequirement,
    strategy: MeldStrategy,
) -> Result<bool, GameError> {
    validate(cards, requirement, strategy).map(|v| v.satisfied)
}

fn split_jokers(cards: &[Card]) -> (Vec<Card>, usize) {
    let naturals: Vec<Card> = cards.iter().filter(|c| !c.is_joker()).copied().collect();
    let jokers = cards.len() - naturals.len();
    (naturals, jokers)
}

fn natural(suit: Suit, index: usize) -> Card {
    Card {
        suit,
        rank: Rank::from_run_index(index).unwrap_or(Rank::Ace),
    }
}

/// Trios first, then runs from what remains. Jokers only pad trios while
/// `requirement.trios` is still short.
pub fn greedy_partition(cards: &[Card], requirement: RoundRequirement) -> Partition {
    let (naturals, mut jokers) = split_jokers(cards);
    let mut melds = Vec::new();

    let mut by_rank: BTreeMap<Rank, Vec<Card>> = BTreeMap::new();
    for card in naturals {
        by_rank.entry(card.rank).or_default().push(card);
    }

    // A rank group yields at most one trio; full groups cost no joker.
    by_rank.retain(|_, group| {
        if group.len() >= MIN_TRIO_LEN {
            melds.push(Meld {
                kind: MeldKind::Trio,
                cards: std::mem::take(group),
            });
            false
        } else {
            true
        }
    });
    let mut trios = melds.len();
    for needed in 1..MIN_TRIO_LEN {
        for group in by_rank.values_mut() {
            if trios >= requirement.trios as usize || jokers < needed {
                break;
            }
            if group.len() == MIN_TRIO_LEN - needed {
                let mut trio = std::mem::take(group);
                trio.extend(std::iter::repeat_n(Card::JOKER, needed));
                jokers -= needed;
                trios += 1;
                melds.push(Meld {
                    kind: MeldKind::Trio,
                    cards: trio,
                });
            }
        }
    }

    let remaining: Vec<Card> = by_rank.into_values().flatten().collect();
    let mut leftover = Vec::new();
    for suit in all_suits() {
        let mut counts = [0usize; RANKS];
        for index in remaining
            .iter()
            .filter(|c| c.suit == suit)
            .filter_map(|c| c.rank.run_index())
        {
            counts[index] += 1;
        }
        // Duplicate copies from the second deck form their own layer.
        while counts.iter().any(|&n| n > 0) {
            let layer: Vec<usize> = (0..RANKS).filter(|&i| counts[i] > 0).collect();
            for &i in &layer {
                counts[i] -= 1;
            }
            scan_layer(suit, &layer, &mut jokers, &mut melds, &mut leftover);
        }
    }
    leftover.extend(std::iter::repeat_n(Card::JOKER, jokers));

    Partition { melds, leftover }
}

/// Cuts one layer of distinct rank indices of a suit into runs. Gaps are
/// bridged only while the run is still shorter than [`MIN_RUN_LEN`] and the
/// bridge costs no more than padding would.
fn scan_layer(
    suit: Suit,
    layer: &[usize],
    jokers: &mut usize,
    melds: &mut Vec<Meld>,
    leftover: &mut Vec<Card>,
) {
    let mut i = 0;
    while i < layer.len() {
        let mut segment = vec![layer[i]];
        let mut last = layer[i];
        let mut bridged = 0;
        let mut j = i + 1;
        while j < layer.len() {
            let gap = layer[j] - last - 1;
            let deficit = MIN_RUN_LEN.saturating_sub(segment.len() + bridged);
            let affordable = bridged + gap <= *jokers && gap <= deficit;
            if gap == 0 || (deficit > 0 && affordable) {
                bridged += gap;
                segment.push(layer[j]);
                last = layer[j];
                j += 1;
            } else {
                break;
            }
        }

        let lo = layer[i];
        let deficit = MIN_RUN_LEN.saturating_sub(segment.len() + bridged);
        let room = lo + (RANKS - 1 - last);
        let spent = bridged + deficit;
        if spent <= *jokers && deficit <= room {
            *jokers -= spent;
            melds.push(build_run(suit, &segment, deficit));
        } else {
            leftover.extend(segment.iter().map(|&k| natural(suit, k)));
        }
        i = j;
    }
}

/// Lays out a run in rank order, jokers in the gaps, then `extra` jokers on
/// the high end (spilling to the low end at the King).
fn build_run(suit: Suit, segment: &[usize], extra: usize) -> Meld {
    let (lo, hi) = match (segment.first(), segment.last()) {
        (Some(&lo), Some(&hi)) => (lo, hi),
        _ => {
            return Meld {
                kind: MeldKind::Run,
                cards: Vec::new(),
            }
        }
    };
    let mut cards: Vec<Card> = (lo..=hi)
        .map(|k| {
            if segment.contains(&k) {
                natural(suit, k)
            } else {
                Card::JOKER
            }
        })
        .collect();
    let high = extra.min(RANKS - 1 - hi);
    cards.extend(std::iter::repeat_n(Card::JOKER, high));
    let mut low = vec![Card::JOKER; extra - high];
    low.append(&mut cards);
    Meld {
        kind: MeldKind::Run,
        cards: low,
    }
}

/// Card counts by suit and run index, plus loose jokers.
#[derive(Debug, Clone)]
struct Pool {
    counts: [[usize; RANKS]; 4],
    jokers: usize,
}

impl Pool {
    fn from_cards(cards: &[Card]) -> Self {
        let mut pool = Pool {
            counts: [[0; RANKS]; 4],
            jokers: 0,
        };
        for card in cards {
            match card.rank.run_index() {
                Some(index) => pool.counts[suit_slot(card.suit)][index] += 1,
                None => pool.jokers += 1,
            }
        }
        pool
    }

    fn into_cards(self) -> Vec<Card> {
        let mut cards = Vec::new();
        for suit in all_suits() {
            for (index, &n) in self.counts[suit_slot(suit)].iter().enumerate() {
                cards.extend(std::iter::repeat_n(natural(suit, index), n));
            }
        }
        cards.extend(std::iter::repeat_n(Card::JOKER, self.jokers));
        cards
    }
}

fn suit_slot(suit: Suit) -> usize {
    match suit {
        Suit::Hearts => 0,
        Suit::Diamonds => 1,
        Suit::Clubs => 2,
        Suit::Spades => 3,
        Suit::Joker => 0,
    }
}

/// Backtracking search over minimal melds (trios of 3, runs of 4, each with
/// at least one natural). Any larger meld contains a minimal one, so this
/// finds a partition iff one exists.
pub fn exhaustive_partition(cards: &[Card], requirement: RoundRequirement) -> Option<Partition> {
    let mut pool = Pool::from_cards(cards);
    let mut melds = Vec::new();
    let found = search_trios(
        &mut pool,
        requirement.trios as usize,
        requirement.runs as usize,
        0,
        &mut melds,
    );
    found.then(|| Partition {
        melds,
        leftover: pool.into_cards(),
    })
}

fn search_trios(
    pool: &mut Pool,
    trios: usize,
    runs: usize,
    from_rank: usize,
    melds: &mut Vec<Meld>,
) -> bool {
    if trios == 0 {
        return search_runs(pool, runs, 0, melds);
    }
    for rank in from_rank..RANKS {
        for naturals in (1..=MIN_TRIO_LEN).rev() {
            let jokers = MIN_TRIO_LEN - naturals;
            if jokers > pool.jokers {
                continue;
            }
            let column: [usize; 4] = std::array::from_fn(|s| pool.counts[s][rank]);
            for take in compositions(naturals, column) {
                for (s, &n) in take.iter().enumerate() {
                    pool.counts[s][rank] -= n;
                }
                pool.jokers -= jokers;
                melds.push(trio_from(rank, take, jokers));

                if search_trios(pool, trios - 1, runs, rank, melds) {
                    return true;
                }

                melds.pop();
                pool.jokers += jokers;
                for (s, &n) in take.iter().enumerate() {
                    pool.counts[s][rank] += n;
                }
            }
        }
    }
    false
}

fn search_runs(pool: &mut Pool, runs: usize, from_slot: usize, melds: &mut Vec<Meld>) -> bool {
    if runs == 0 {
        return true;
    }
    let starts = RANKS - MIN_RUN_LEN + 1;
    for slot in from_slot..4 * starts {
        let (s, start) = (slot / starts, slot % starts);
        let window = start..start + MIN_RUN_LEN;
        let missing = window.clone().filter(|&k| pool.counts[s][k] == 0).count();
        if missing > pool.jokers || missing == MIN_RUN_LEN {
            continue;
        }
        let suit = all_suits()[s];
        let mut cards = Vec::with_capacity(MIN_RUN_LEN);
        for k in window.clone() {
            if pool.counts[s][k] > 0 {
                pool.counts[s][k] -= 1;
                cards.push(natural(suit, k));
            } else {
                cards.push(Card::JOKER);
            }
        }
        pool.jokers -= missing;
        melds.push(Meld {
            kind: MeldKind::Run,
            cards,
        });

        // Same slot again: the second deck may hold a parallel run.
        if search_runs(pool, runs - 1, slot, melds) {
            return true;
        }

        if let Some(meld) = melds.pop() {
            for (offset, card) in meld.cards.iter().enumerate() {
                if !card.is_joker() {
                    pool.counts[s][start + offset] += 1;
                }
            }
        }
        pool.jokers += missing;
    }
    false
}

fn trio_from(rank: usize, take: [usize; 4], jokers: usize) -> Meld {
    let mut cards = Vec::with_capacity(MIN_TRIO_LEN);
    for (s, &n) in take.iter().enumerate() {
        cards.extend(std::iter::repeat_n(natural(all_suits()[s], rank), n));
    }
    cards.extend(std::iter::repeat_n(Card::JOKER, jokers));
    Meld {
        kind: MeldKind::Trio,
        cards,
    }
}

/// Every way to pick `total` cards from four suit piles of the given sizes.
fn compositions(total: usize, available: [usize; 4]) -> Vec<[usize; 4]> {
    let mut out = Vec::new();
    let mut current = [0usize; 4];
    fn recurse(
        slot: usize,
        left: usize,
        available: &[usize; 4],
        current: &mut [usize; 4],
        out: &mut Vec<[usize; 4]>,
    ) {
        if slot == 4 {
            if left == 0 {
                out.push(*current);
            }
            return;
        }
        let max = available[slot].min(left);
        for n in 0..=max {
            current[slot] = n;
            recurse(slot + 1, left - n, available, current, out);
        }
        current[slot] = 0;
    }
    recurse(0, total, &available, &mut current, &mut out);
    out
}
