//! Apply/Revert Round Trip Property Tests
//!
//! Random valid block sequences are applied and then reverted one block at a
//! time; after each revert every tree must be byte-identical to the state
//! before that block. Blocks carry several transactions, so later ones see
//! the effects of earlier ones in the same block.

mod common;

use common::*;
use lib_botregistry::constants::BOT_MONTH;
use lib_botregistry::storage::store::StoreSnapshot;
use lib_botregistry::{BotId, BotTransaction};
use proptest::prelude::*;

const NAMES: [&str; 6] = [
    "alpha.example",
    "bravo.example",
    "charlie.example",
    "delta.example",
    "oscar.example",
    "tango.example",
];

#[derive(Debug, Clone)]
enum Op {
    Register { seed: u8, names: Vec<usize>, months: u8 },
    Renew { bot: usize, months: u8 },
    AddName { bot: usize, name: usize },
    RemoveName { bot: usize, name: usize },
    Transfer { from: usize, to: usize, name: usize },
}

/// One block: how far the clock moves, and the transactions it tries to carry
#[derive(Debug, Clone)]
struct Step {
    advance_months: u8,
    ops: Vec<Op>,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u8..6, prop::collection::vec(0usize..NAMES.len(), 0..3), 1u8..3)
            .prop_map(|(seed, names, months)| Op::Register { seed, names, months }),
        (0usize..5, 1u8..4).prop_map(|(bot, months)| Op::Renew { bot, months }),
        (0usize..5, 0usize..NAMES.len()).prop_map(|(bot, name)| Op::AddName { bot, name }),
        (0usize..5, 0usize..NAMES.len()).prop_map(|(bot, name)| Op::RemoveName { bot, name }),
        (0usize..5, 0usize..5, 0usize..NAMES.len())
            .prop_map(|(from, to, name)| Op::Transfer { from, to, name }),
    ]
}

fn step_strategy() -> impl Strategy<Value = Step> {
    (0u8..3, prop::collection::vec(op_strategy(), 1..5))
        .prop_map(|(advance_months, ops)| Step { advance_months, ops })
}

/// Registered bots, in registration order
struct Bots(Vec<(TestBot, BotId)>);

impl Bots {
    fn pick(&self, index: usize) -> Option<&(TestBot, BotId)> {
        if self.0.is_empty() {
            None
        } else {
            Some(&self.0[index % self.0.len()])
        }
    }
}

fn build_tx(op: &Op, bots: &Bots) -> Option<BotTransaction> {
    match op {
        Op::Register { seed, names, months } => {
            let mut chosen: Vec<&str> = names.iter().map(|i| NAMES[*i]).collect();
            chosen.sort_unstable();
            chosen.dedup();
            Some(registration(&TestBot::new(*seed), &chosen, &["example.org"], *months))
        }
        Op::Renew { bot, months } => {
            let (key, id) = bots.pick(*bot)?;
            Some(renewal(key, *id, *months))
        }
        Op::AddName { bot, name } => {
            let (key, id) = bots.pick(*bot)?;
            let mut tx = blank_update(*id);
            tx.names_to_add = names(&[NAMES[*name]]);
            Some(signed_update(key, tx))
        }
        Op::RemoveName { bot, name } => {
            let (key, id) = bots.pick(*bot)?;
            let mut tx = blank_update(*id);
            tx.names_to_remove = names(&[NAMES[*name]]);
            Some(signed_update(key, tx))
        }
        Op::Transfer { from, to, name } => {
            let (from_key, from_id) = bots.pick(*from)?;
            let (to_key, to_id) = bots.pick(*to)?;
            Some(transfer((from_key, *from_id), (to_key, *to_id), &[NAMES[*name]]))
        }
    }
}

/// Whether `tx` still applies after the transactions already admitted to the block
fn applies_after(chain: &mut TestChain, time: u64, admitted: &[BotTransaction], tx: &BotTransaction) -> bool {
    let mut trial = admitted.to_vec();
    trial.push(tx.clone());
    if chain.push_unchecked(time, trial).is_err() {
        return false;
    }
    chain.pop().expect("trial block reverts");
    true
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_revert_restores_every_tree(steps in prop::collection::vec(step_strategy(), 1..16)) {
        let mut chain = TestChain::in_memory();
        let mut bots = Bots(Vec::new());
        let mut snapshots: Vec<StoreSnapshot> = Vec::new();
        let mut time = T0;

        for step in &steps {
            time += step.advance_months as u64 * BOT_MONTH + 60;

            let mut txs: Vec<BotTransaction> = Vec::new();
            for tx in step.ops.iter().filter_map(|op| build_tx(op, &bots)) {
                if !txs.contains(&tx)
                    && chain.registry.validate_transaction(&tx, time).is_ok()
                    && applies_after(&mut chain, time, &txs, &tx)
                {
                    txs.push(tx);
                }
            }

            snapshots.push(chain.registry.store().snapshot().unwrap());
            chain.push_unchecked(time, txs).unwrap();

            for op in &step.ops {
                if let Op::Register { seed, .. } = op {
                    let bot = TestBot::new(*seed);
                    if let Ok(record) = chain.registry.get_record_by_key(&bot.public_key) {
                        if !bots.0.iter().any(|(_, id)| *id == record.id) {
                            bots.0.push((bot, record.id));
                        }
                    }
                }
            }
        }

        while let Some(expected) = snapshots.pop() {
            chain.pop().unwrap();
            prop_assert_eq!(chain.registry.store().snapshot().unwrap(), expected);
        }
        prop_assert_eq!(chain.registry.chain_tip().unwrap(), None);
    }
}
