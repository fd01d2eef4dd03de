use continental_engine::cards::{Card, DOUBLE_DECK_SIZE};
use continental_engine::engine::{Engine, Phase, TurnPhase};
use continental_engine::errors::GameError;
use continental_engine::events::Event;
use continental_engine::ledger::{LedgerTable, MemoryLedger, ScoreLedger};
use continental_engine::player::PlayerAction;
use continental_engine::rules::{hand_penalty, EngineConfig, RoundRequirement, MAX_ROUNDS};

fn c(suit: &str, rank: &str) -> Card {
    Card::parse(suit, rank).expect("valid card")
}

fn table(ids: &[&str]) -> Engine {
    let mut engine = Engine::new(EngineConfig::seeded(2024));
    for id in ids {
        engine.connect(id).expect("seat available");
    }
    engine
}

fn current(engine: &Engine) -> String {
    engine.current_player().cloned().expect("round in progress")
}

/// Draw, then discard the first card held.
fn play_turn(engine: &mut Engine) {
    let actor = current(engine);
    engine.draw_from_deck(&actor).expect("draw");
    let card = engine.state().hand(&actor).expect("hand")[0];
    engine.discard(&actor, card).expect("discard");
}

fn trio(rank: &str) -> Vec<Card> {
    ["hearts", "spades", "diamonds"]
        .iter()
        .map(|s| c(s, rank))
        .collect()
}

fn run(suit: &str, ranks: [&str; 4]) -> Vec<Card> {
    ranks.iter().map(|r| c(suit, r)).collect()
}

/// A hand meeting `req` whose trios and runs share no rank, so the greedy
/// pass cannot mistake one for the other.
fn winning_hand(req: RoundRequirement) -> Vec<Card> {
    let mut hand = Vec::new();
    for rank in ["K", "Q", "J"].iter().take(req.trios as usize) {
        hand.extend(trio(rank));
    }
    let runs = [
        run("hearts", ["A", "2", "3", "4"]),
        run("spades", ["5", "6", "7", "8"]),
        run("clubs", ["9", "10", "J", "Q"]),
    ];
    for r in runs.into_iter().take(req.runs as usize) {
        hand.extend(r);
    }
    hand
}

#[test]
fn turns_rotate_in_seat_order() {
    let mut engine = table(&["a", "b", "c"]);
    engine.start_round("b").unwrap();
    let mut seen = vec![current(&engine)];
    for _ in 0..3 {
        play_turn(&mut engine);
        seen.push(current(&engine));
    }
    assert_eq!(seen, vec!["a", "b", "c", "a"]);
}

#[test]
fn out_of_turn_actions_change_nothing() {
    let mut engine = table(&["a", "b"]);
    engine.start_round("a").unwrap();
    let before = engine.snapshot(Some("b"));
    let err = engine.apply("b", PlayerAction::DrawCard).unwrap_err();
    assert_eq!(
        err,
        GameError::NotYourTurn {
            expected: "a".into(),
            actual: "b".into()
        }
    );
    assert_eq!(engine.snapshot(Some("b")), before);
}

#[test]
fn discard_requires_a_draw_and_a_held_card() {
    let mut engine = table(&["a", "b"]);
    engine.start_round("a").unwrap();
    let card = engine.state().hand("a").unwrap()[0];
    assert!(matches!(
        engine.discard("a", card),
        Err(GameError::InvalidAction(_))
    ));
    assert_eq!(
        engine.take_from_discard("a"),
        Err(GameError::EmptyDiscardPile)
    );

    engine.draw_from_deck("a").unwrap();
    let missing = c("hearts", "A");
    engine
        .state_mut_for_test()
        .set_hand_for_test("a", vec![c("clubs", "2")]);
    assert_eq!(
        engine.discard("a", missing),
        Err(GameError::CardNotInHand(missing))
    );
    assert!(matches!(
        engine.draw_from_deck("a"),
        Err(GameError::InvalidAction(_))
    ));
}

#[test]
fn take_from_discard_picks_up_the_face_up_card() {
    let mut engine = table(&["a", "b"]);
    engine.start_round("a").unwrap();
    engine.draw_from_deck("a").unwrap();
    let card = engine.state().hand("a").unwrap()[2];
    engine.discard("a", card).unwrap();

    let outcome = engine.take_from_discard("b").unwrap();
    assert!(engine.state().discard_pile().is_empty());
    assert!(engine.state().hand("b").unwrap().contains(&card));
    assert!(outcome
        .events
        .iter()
        .any(|d| d.event == Event::CardTaken { player_id: "b".into(), card }));
}

#[test]
fn rejected_close_leaves_round_and_scores_alone() {
    let mut engine = table(&["a", "b"]);
    engine.start_round("a").unwrap();
    engine.draw_from_deck("a").unwrap();
    engine
        .state_mut_for_test()
        .set_hand_for_test("a", vec![c("hearts", "2"), c("spades", "5"), c("clubs", "9")]);
    let before = engine.snapshot(Some("a"));

    let err = engine.apply("a", PlayerAction::Close).unwrap_err();
    assert_eq!(err, GameError::InvalidClose);
    assert_eq!(engine.snapshot(Some("a")), before);
    assert_eq!(engine.state().round(), 1);
    assert!(engine.state().players_opened().is_empty());
}

#[test]
fn close_scores_hands_and_waits_for_next_round() {
    let mut engine = table(&["a", "b"]);
    engine.start_round("a").unwrap();
    engine.draw_from_deck("a").unwrap();
    {
        let state = engine.state_mut_for_test();
        state.set_hand_for_test("a", winning_hand(RoundRequirement::new(2, 0)));
        state.set_hand_for_test("b", vec![c("clubs", "K"), Card::JOKER, c("hearts", "A")]);
    }

    let outcome = engine.close("a").unwrap();
    assert_eq!(engine.phase(), Phase::NextRound);
    assert_eq!(engine.state().round(), 2);
    assert_eq!(engine.state().scores().get("a"), Some(&0));
    assert_eq!(engine.state().scores().get("b"), Some(&80));
    assert!(engine.state().round_scores().values().all(|&p| p == 0));

    let next = outcome
        .events
        .iter()
        .find_map(|d| match &d.event {
            Event::NextRound {
                round,
                round_scores,
                ..
            } => Some((*round, round_scores.clone())),
            _ => None,
        })
        .expect("nextRound broadcast");
    assert_eq!(next.0, 2);
    assert_eq!(next.1.get("b"), Some(&80));

    assert_eq!(outcome.ledger.len(), 2);
    assert!(outcome
        .ledger
        .iter()
        .all(|e| e.table == LedgerTable::OngoingScores && e.round == 1));

    // Turn actions are refused between rounds.
    assert!(matches!(
        engine.draw_from_deck("b"),
        Err(GameError::InvalidAction(_))
    ));
    engine.start_round("b").unwrap();
    assert_eq!(engine.state().hand("a").unwrap().len(), 8);
    assert_eq!(engine.state().card_count(), DOUBLE_DECK_SIZE);
}

#[test]
fn progressive_opening_then_close() {
    let mut engine = table(&["a", "b"]);
    engine.start_round("a").unwrap();
    engine.draw_from_deck("a").unwrap();
    let mut hand = winning_hand(RoundRequirement::new(2, 0));
    hand.push(c("clubs", "4"));
    engine.state_mut_for_test().set_hand_for_test("a", hand.clone());

    assert!(matches!(
        engine.select_card_for_opening("a", hand[0]),
        Err(GameError::InvalidAction(_))
    ));
    engine.open("a").unwrap();
    assert_eq!(
        engine.select_card_for_opening("a", c("diamonds", "2")),
        Err(GameError::CardNotInHand(c("diamonds", "2")))
    );

    for (i, card) in hand.iter().take(6).enumerate() {
        let outcome = engine.select_card_for_opening("a", *card).unwrap();
        let names = outcome.names();
        if i < 5 {
            assert!(names.contains(&"invalidOpening"));
            assert!(!engine.state().has_opened("a"));
        } else {
            assert!(names.contains(&"openValid"));
            assert!(names.contains(&"showPostOpenActions"));
        }
    }
    assert!(engine.state().has_opened("a"));
    assert_eq!(engine.state().opened_by("a").len(), 6);
    assert_eq!(engine.state().hand("a").unwrap(), &[c("clubs", "4")]);

    engine.close("a").unwrap();
    assert_eq!(engine.phase(), Phase::NextRound);
}

#[test]
fn opening_keeps_a_card_to_discard() {
    let mut engine = table(&["a", "b"]);
    engine.start_round("a").unwrap();
    engine.draw_from_deck("a").unwrap();
    let hand = vec![c("hearts", "2"), c("spades", "5"), c("clubs", "9")];
    engine.state_mut_for_test().set_hand_for_test("a", hand.clone());
    engine.open("a").unwrap();

    engine.select_card_for_opening("a", hand[0]).unwrap();
    engine.select_card_for_opening("a", hand[1]).unwrap();
    assert!(matches!(
        engine.select_card_for_opening("a", hand[2]),
        Err(GameError::InvalidAction(_))
    ));
    assert_eq!(engine.state().hand("a").unwrap(), &[hand[2]]);
    assert_eq!(engine.state().opened_by("a").len(), 2);

    engine.discard("a", hand[2]).unwrap();
    assert_eq!(current(&engine), "b");
    engine.draw_from_deck("b").unwrap();
}

#[test]
fn last_card_may_complete_the_opening() {
    let mut engine = table(&["a", "b"]);
    engine.start_round("a").unwrap();
    engine.draw_from_deck("a").unwrap();
    let hand = winning_hand(RoundRequirement::new(2, 0));
    engine.state_mut_for_test().set_hand_for_test("a", hand.clone());
    engine.open("a").unwrap();

    for card in &hand {
        engine.select_card_for_opening("a", *card).unwrap();
    }
    assert!(engine.state().hand("a").unwrap().is_empty());
    assert!(engine.state().has_opened("a"));

    engine.close("a").unwrap();
    assert_eq!(engine.phase(), Phase::NextRound);
    assert_eq!(engine.state().scores().get("a"), Some(&0));
}

#[test]
fn game_over_after_round_seven() {
    let mut engine = table(&["a", "b", "c"]);
    let ledger = MemoryLedger::new();

    for round in 1..=MAX_ROUNDS {
        engine.start_round("c").unwrap();
        assert_eq!(engine.state().round(), round);
        assert_eq!(current(&engine), "a");
        let req = engine.state().requirement().unwrap();
        let penalties: i32 = ["b", "c"]
            .iter()
            .map(|id| hand_penalty(engine.state().hand(id).unwrap()))
            .sum();
        assert!(penalties > 0);

        engine.draw_from_deck("a").unwrap();
        engine
            .state_mut_for_test()
            .set_hand_for_test("a", winning_hand(req));
        let outcome = engine.close("a").unwrap();
        ledger.append(&outcome.ledger).unwrap();

        let names = outcome.names();
        if round < MAX_ROUNDS {
            assert!(names.contains(&"nextRound"));
            assert!(!names.contains(&"gameOver"));
        } else {
            assert!(names.contains(&"gameOver"));
            assert!(!names.contains(&"nextRound"));
        }
    }

    assert_eq!(engine.phase(), Phase::GameOver);
    let completed = ledger.rows_in(LedgerTable::CompletedScores);
    assert_eq!(completed.len(), 3);
    for id in ["a", "b", "c"] {
        let rows: Vec<_> = completed.iter().filter(|e| e.player_id == id).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(Some(&rows[0].score), engine.state().scores().get(id));
    }
    assert_eq!(engine.state().scores().get("a"), Some(&0));
    assert_eq!(
        ledger.rows_in(LedgerTable::OngoingScores).len(),
        3 * MAX_ROUNDS as usize
    );

    // Starting again begins a fresh game.
    engine.start_round("b").unwrap();
    assert_eq!(engine.state().round(), 1);
    assert!(engine.state().scores().values().all(|&s| s == 0));
}

#[test]
fn draw_pile_exhaustion_follows_policy() {
    let discards = vec![c("hearts", "2"), c("hearts", "3"), c("hearts", "4")];

    let mut reject = Engine::new(EngineConfig {
        draw_pile: continental_engine::rules::DrawPilePolicy::Reject,
        ..EngineConfig::seeded(5)
    });
    reject.connect("a").unwrap();
    reject.start_round("a").unwrap();
    reject.state_mut_for_test().set_draw_pile_for_test(Vec::new());
    reject
        .state_mut_for_test()
        .set_discard_pile_for_test(discards.clone());
    assert_eq!(reject.draw_from_deck("a"), Err(GameError::EmptyDrawPile));
    assert_eq!(reject.state().discard_pile().len(), 3);

    let mut reshuffle = Engine::new(EngineConfig::seeded(5));
    reshuffle.connect("a").unwrap();
    reshuffle.start_round("a").unwrap();
    reshuffle
        .state_mut_for_test()
        .set_draw_pile_for_test(Vec::new());
    reshuffle
        .state_mut_for_test()
        .set_discard_pile_for_test(discards.clone());
    let outcome = reshuffle.draw_from_deck("a").unwrap();
    assert!(outcome.names().contains(&"drawPileRestocked"));
    assert_eq!(reshuffle.state().discard_pile(), &[c("hearts", "4")]);
    assert_eq!(reshuffle.state().draw_pile().remaining(), 1);

    let mut dry = Engine::new(EngineConfig::seeded(5));
    dry.connect("a").unwrap();
    dry.start_round("a").unwrap();
    dry.state_mut_for_test().set_draw_pile_for_test(Vec::new());
    dry.state_mut_for_test()
        .set_discard_pile_for_test(vec![c("hearts", "9")]);
    assert_eq!(dry.draw_from_deck("a"), Err(GameError::EmptyDrawPile));
}

#[test]
fn card_count_holds_through_long_play() {
    let mut engine = table(&["a", "b", "c", "d"]);
    engine.start_round("a").unwrap();
    for _ in 0..150 {
        play_turn(&mut engine);
        assert_eq!(engine.state().card_count(), DOUBLE_DECK_SIZE);
    }
    // 150 draws from an 80-card pile recycled the discards along the way.
    assert_eq!(engine.state().hands().values().map(Vec::len).sum::<usize>(), 28);
}

#[test]
fn disconnect_keeps_the_turn_with_the_right_player() {
    let mut engine = table(&["a", "b", "c"]);
    engine.start_round("a").unwrap();
    play_turn(&mut engine);
    assert_eq!(current(&engine), "b");

    // Someone seated before the cursor leaves: still b's turn.
    engine.disconnect("a").unwrap();
    assert_eq!(current(&engine), "b");
    assert_eq!(engine.state().card_count(), DOUBLE_DECK_SIZE);

    // The current player leaves mid-turn: c starts fresh.
    engine.draw_from_deck("b").unwrap();
    let outcome = engine.disconnect("b").unwrap();
    assert_eq!(current(&engine), "c");
    assert_eq!(
        engine.phase(),
        Phase::RoundInProgress {
            turn: TurnPhase::AwaitingDraw
        }
    );
    assert!(outcome
        .events
        .iter()
        .any(|d| d.event == Event::PlayerTurn { player_id: "c".into() }));
    assert_eq!(engine.state().card_count(), DOUBLE_DECK_SIZE);
    assert!(engine.state().scores().get("b").is_none());

    engine.disconnect("c").unwrap();
    assert_eq!(engine.phase(), Phase::Lobby);
}

#[test]
fn late_joiners_wait_for_the_next_round() {
    let mut engine = table(&["a", "b"]);
    engine.start_round("a").unwrap();
    engine.connect("d").unwrap();
    assert!(engine.state().hand("d").is_none());
    assert_eq!(
        engine.draw_from_deck("d"),
        Err(GameError::NotYourTurn {
            expected: "a".into(),
            actual: "d".into()
        })
    );
    assert_eq!(engine.turn_order().players(), &["a", "b"]);
}

#[test]
fn table_caps_at_five_and_rejects_strangers() {
    let mut engine = table(&["a", "b", "c", "d", "e"]);
    let err = engine.connect("f").unwrap_err();
    assert_eq!(err, GameError::GameFull { capacity: 5 });
    assert_eq!(
        engine.start_round("zz"),
        Err(GameError::UnknownPlayer("zz".into()))
    );
    assert_eq!(engine.lobby().len(), 5);
}
