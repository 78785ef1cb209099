//! Table Runtime (C3): the authoritative per-table state machine. Deal,
//! betting rounds, showdown, pot distribution, all behind `applyAction`
//! and friends, all of which return `Result` instead of panicking.

pub mod pots;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use crate::card::Card;
use crate::deck::{derive_hand_seed, Deck};
use crate::error::GameError;
use crate::event_log::EventType;
use crate::eval::{self, Evaluation};
use pots::Pot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Waiting,
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
    Ended,
}

#[derive(Debug, Clone)]
pub struct PlayerSeat {
    pub seat_id: u8,
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
    pub stack: i64,
    pub bet: i64,
    pub folded: bool,
    pub all_in: bool,
    pub is_active: bool,
    pub hole_cards: Option<[Card; 2]>,
    /// Cumulative chips this seat has committed to the pot this hand,
    /// across every street. Used to partition side pots at showdown.
    contributed: i64,
}

impl PlayerSeat {
    fn new(seat_id: u8, agent_id: String, agent_name: String, stack: i64) -> Self {
        Self {
            seat_id,
            agent_id: Some(agent_id),
            agent_name: Some(agent_name),
            stack,
            bet: 0,
            folded: false,
            all_in: false,
            is_active: true,
            hole_cards: None,
            contributed: 0,
        }
    }

    fn dealt_in(&self) -> bool {
        self.is_active && self.stack > 0
    }

    fn can_act(&self) -> bool {
        self.is_active && !self.folded && !self.all_in
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    pub small_blind: i64,
    pub big_blind: i64,
    pub max_seats: u8,
    pub initial_stack: i64,
    pub action_timeout_ms: u64,
    pub min_players_to_start: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Fold,
    Check,
    Call,
    RaiseTo,
}

#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub turn_token: String,
    pub kind: ActionKind,
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegalAction {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum ActionOutcome {
    Applied { seq: u64 },
    /// The same `turn_token` was already processed; the prior result's
    /// `seq` is returned without mutating state (§4.3, §8 property 5).
    Duplicate { seq: u64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatView {
    pub seat_id: u8,
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
    pub stack: i64,
    pub bet: i64,
    pub folded: bool,
    pub all_in: bool,
    pub hole_cards: Option<[Card; 2]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableView {
    pub table_id: String,
    pub seq: u64,
    pub hand_number: u64,
    pub phase: Phase,
    pub dealer_seat: Option<u8>,
    pub current_seat: Option<u8>,
    pub community_cards: Vec<Card>,
    pub pots: Vec<Pot>,
    pub seats: Vec<SeatView>,
    pub to_call: Option<i64>,
    pub min_raise: Option<i64>,
    pub legal_actions: Option<Vec<LegalAction>>,
    pub turn_token: Option<String>,
}

const PROCESSED_TOKEN_CAPACITY: usize = 64;

pub struct TableRuntime {
    pub table_id: String,
    pub config: TableConfig,
    table_seed: String,
    pub phase: Phase,
    pub hand_number: u64,
    pub dealer_seat: Option<u8>,
    pub current_seat: Option<u8>,
    pub seats: BTreeMap<u8, PlayerSeat>,
    pub community_cards: Vec<Card>,
    pub pots: Vec<Pot>,
    deck: Deck,
    pub seq: u64,
    pub turn_token: Option<String>,
    processed_turn_tokens: VecDeque<(String, ActionOutcome)>,

    max_bet: i64,
    last_raise_increment: i64,
    need_to_act: BTreeSet<u8>,
    dealt_in_seats: Vec<u8>,

    events: VecDeque<EmittedEvent>,
}

/// One runtime-emitted event, tagged with the `seq`/`handNumber` it was
/// produced under so the caller can write an accurate `EventRecord`.
#[derive(Debug, Clone)]
pub struct EmittedEvent {
    pub seq: u64,
    pub hand_number: u64,
    pub event_type: EventType,
    pub payload: Value,
}

impl TableRuntime {
    pub fn new(table_id: String, config: TableConfig, seed: Option<String>) -> Self {
        let table_seed = seed.unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            table_id,
            config,
            deck: Deck::new(&table_seed),
            table_seed,
            phase: Phase::Waiting,
            hand_number: 0,
            dealer_seat: None,
            current_seat: None,
            seats: BTreeMap::new(),
            community_cards: Vec::new(),
            pots: Vec::new(),
            seq: 0,
            turn_token: None,
            processed_turn_tokens: VecDeque::new(),
            max_bet: 0,
            last_raise_increment: 0,
            need_to_act: BTreeSet::new(),
            dealt_in_seats: Vec::new(),
            events: VecDeque::new(),
        }
    }

    /// Drains events accumulated by the last operation, for the caller to
    /// log and broadcast (mirrors the closed-set event-bus redesign of §9).
    pub fn drain_events(&mut self) -> Vec<EmittedEvent> {
        self.events.drain(..).collect()
    }

    fn emit(&mut self, ty: EventType, payload: Value) {
        self.events.push_back(EmittedEvent {
            seq: self.seq,
            hand_number: self.hand_number,
            event_type: ty,
            payload,
        });
    }

    pub(crate) fn bump_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn mint_turn_token(&mut self) -> String {
        let token = Uuid::new_v4().to_string();
        self.turn_token = Some(token.clone());
        token
    }

    // ---- C3: seat management ----

    pub fn add_player(
        &mut self,
        seat_id: u8,
        agent_id: String,
        agent_name: String,
        stack: i64,
    ) -> Result<(), GameError> {
        if seat_id as usize >= self.config.max_seats as usize {
            return Err(GameError::InvalidSeat(seat_id));
        }
        if self.seats.contains_key(&seat_id) {
            return Err(GameError::SeatTaken(seat_id));
        }
        self.seats
            .insert(seat_id, PlayerSeat::new(seat_id, agent_id, agent_name, stack));
        Ok(())
    }

    pub fn remove_player(&mut self, seat_id: u8) -> Result<(), GameError> {
        let hand_in_progress = !matches!(self.phase, Phase::Waiting | Phase::Ended);
        match self.seats.get_mut(&seat_id) {
            Some(seat) if hand_in_progress => {
                if !seat.folded {
                    seat.folded = true;
                    self.need_to_act.remove(&seat_id);
                    if self.current_seat == Some(seat_id) {
                        self.advance_turn_or_close_round();
                    } else {
                        self.maybe_award_uncontested();
                    }
                }
                seat.is_active = false;
                Ok(())
            }
            Some(_) => {
                self.seats.remove(&seat_id);
                Ok(())
            }
            None => Err(GameError::InvalidSeat(seat_id)),
        }
    }

    // ---- C3: hand lifecycle ----

    pub fn start_hand(&mut self) -> Result<bool, GameError> {
        let eligible: Vec<u8> = self
            .seats
            .values()
            .filter(|s| s.is_active && s.stack > 0)
            .map(|s| s.seat_id)
            .collect();
        if eligible.len() < 2 {
            return Ok(false);
        }

        self.hand_number += 1;
        self.dealt_in_seats = eligible.clone();
        let hand_seed = derive_hand_seed(&self.table_seed, self.hand_number);
        self.deck = Deck::new(&hand_seed);
        self.community_cards.clear();
        self.pots.clear();

        for seat in self.seats.values_mut() {
            seat.bet = 0;
            seat.folded = !eligible.contains(&seat.seat_id);
            seat.all_in = false;
            seat.hole_cards = None;
            seat.contributed = 0;
        }

        self.dealer_seat = Some(match self.dealer_seat {
            None => eligible[0],
            Some(prev) => self.next_in(prev, &eligible).unwrap_or(eligible[0]),
        });
        let dealer = self.dealer_seat.unwrap();

        // Heads-up is special-cased: the dealer posts the small blind
        // directly rather than the seat after them (§8 S1).
        let (sb_seat, bb_seat) = if eligible.len() == 2 {
            let bb = self.next_in(dealer, &eligible).unwrap_or(dealer);
            (dealer, bb)
        } else {
            let sb = self.next_in(dealer, &eligible).unwrap_or(dealer);
            let bb = self.next_in(sb, &eligible).unwrap_or(sb);
            (sb, bb)
        };

        self.post_blind(sb_seat, self.config.small_blind);
        self.post_blind(bb_seat, self.config.big_blind);
        self.max_bet = self.config.big_blind;
        self.last_raise_increment = self.config.big_blind;

        for &seat_id in &eligible {
            let cards = self.deck.draw(2)?;
            let seat = self.seats.get_mut(&seat_id).unwrap();
            seat.hole_cards = Some([cards[0], cards[1]]);
        }

        self.phase = Phase::Preflop;
        self.need_to_act = eligible
            .iter()
            .copied()
            .filter(|s| self.seats[s].can_act())
            .collect();
        self.current_seat = self.next_in(bb_seat, &eligible);
        self.mint_turn_token();
        self.bump_seq();

        debug!(table = %self.table_id, hand = self.hand_number, dealer, "hand started");
        self.emit(
            EventType::HandStart,
            json!({
                "hand_number": self.hand_number,
                "dealer_seat": dealer,
                "small_blind_seat": sb_seat,
                "big_blind_seat": bb_seat,
            }),
        );
        Ok(true)
    }

    fn post_blind(&mut self, seat_id: u8, amount: i64) {
        let seat = self.seats.get_mut(&seat_id).unwrap();
        let post = amount.min(seat.stack);
        seat.stack -= post;
        seat.bet += post;
        seat.contributed += post;
        if seat.stack == 0 {
            seat.all_in = true;
        }
    }

    /// Next seat id after `from` within `ring`, cycling, excluding `from`
    /// itself unless it is the only entry.
    fn next_in(&self, from: u8, ring: &[u8]) -> Option<u8> {
        if ring.is_empty() {
            return None;
        }
        let pos = ring.iter().position(|&s| s == from);
        match pos {
            Some(i) => Some(ring[(i + 1) % ring.len()]),
            None => ring.first().copied(),
        }
    }

    // ---- C3: action application ----

    pub fn apply_action(&mut self, seat_id: u8, req: ActionRequest) -> Result<ActionOutcome, GameError> {
        if let Some((_, outcome)) = self
            .processed_turn_tokens
            .iter()
            .find(|(token, _)| *token == req.turn_token)
        {
            return Ok(outcome.clone());
        }

        if self.current_seat != Some(seat_id) {
            return Err(GameError::NotYourTurn(self.current_seat.unwrap_or(seat_id)));
        }
        match &self.turn_token {
            Some(current) if *current == req.turn_token => {}
            _ => return Err(GameError::StaleToken),
        }

        self.validate_and_apply(seat_id, &req)?;

        let seq = self.bump_seq();
        self.record_processed(req.turn_token.clone(), ActionOutcome::Applied { seq });
        self.mint_turn_token();

        self.emit(
            EventType::PlayerAction,
            json!({
                "seat_id": seat_id,
                "kind": action_kind_str(req.kind),
                "amount": req.amount,
                "is_timeout": false,
            }),
        );

        if !self.maybe_award_uncontested() {
            self.advance_turn_or_close_round();
        }

        Ok(ActionOutcome::Applied { seq })
    }

    /// Used by the timeout timer and by a kicked-player path; folds the
    /// seat as if it had acted. Idempotent when already folded (§4.8).
    pub fn force_fold(&mut self, seat_id: u8) -> Result<Option<u64>, GameError> {
        let seat = self.seats.get(&seat_id).ok_or(GameError::InvalidSeat(seat_id))?;
        if seat.folded || !matches!(self.phase, Phase::Preflop | Phase::Flop | Phase::Turn | Phase::River) {
            return Ok(None);
        }
        self.seats.get_mut(&seat_id).unwrap().folded = true;
        self.need_to_act.remove(&seat_id);
        let seq = self.bump_seq();
        self.mint_turn_token();
        self.emit(
            EventType::PlayerAction,
            json!({ "seat_id": seat_id, "kind": "fold", "amount": Value::Null, "is_timeout": true }),
        );
        if !self.maybe_award_uncontested() {
            if self.current_seat == Some(seat_id) {
                self.advance_turn_or_close_round();
            }
        }
        Ok(Some(seq))
    }

    fn record_processed(&mut self, token: String, outcome: ActionOutcome) {
        self.processed_turn_tokens.push_back((token, outcome));
        while self.processed_turn_tokens.len() > PROCESSED_TOKEN_CAPACITY {
            self.processed_turn_tokens.pop_front();
        }
    }

    fn legal_actions_for(&self, seat_id: u8) -> Vec<LegalAction> {
        let seat = &self.seats[&seat_id];
        let to_call = self.max_bet - seat.bet;
        let mut out = vec![LegalAction {
            kind: "fold",
            min: None,
            max: None,
        }];
        if to_call == 0 {
            out.push(LegalAction {
                kind: "check",
                min: None,
                max: None,
            });
        } else {
            out.push(LegalAction {
                kind: "call",
                min: Some(to_call.min(seat.stack)),
                max: Some(to_call.min(seat.stack)),
            });
        }
        let min_raise = (self.max_bet + self.last_raise_increment).max(2 * self.config.big_blind);
        if seat.stack + seat.bet > self.max_bet {
            out.push(LegalAction {
                kind: "raiseTo",
                min: Some(min_raise.min(seat.stack + seat.bet)),
                max: Some(seat.stack + seat.bet),
            });
        }
        out
    }

    fn validate_and_apply(&mut self, seat_id: u8, req: &ActionRequest) -> Result<(), GameError> {
        let seat = self.seats.get(&seat_id).unwrap();
        let to_call = self.max_bet - seat.bet;

        match req.kind {
            ActionKind::Fold => {
                self.seats.get_mut(&seat_id).unwrap().folded = true;
            }
            ActionKind::Check => {
                if to_call != 0 {
                    return Err(GameError::invalid_action("check requires bet == maxBet"));
                }
            }
            ActionKind::Call => {
                if to_call <= 0 {
                    return Err(GameError::invalid_action("nothing to call"));
                }
                let pay = to_call.min(seat.stack);
                let s = self.seats.get_mut(&seat_id).unwrap();
                s.stack -= pay;
                s.bet += pay;
                s.contributed += pay;
                if s.stack == 0 {
                    s.all_in = true;
                }
            }
            ActionKind::RaiseTo => {
                let amount = req
                    .amount
                    .ok_or_else(|| GameError::invalid_action("raiseTo requires an amount"))?;
                let min_required = (self.max_bet + self.last_raise_increment).max(2 * self.config.big_blind);
                let max_possible = seat.bet + seat.stack;
                if amount > max_possible {
                    return Err(GameError::invalid_action("raise exceeds stack"));
                }
                let is_all_in = amount == max_possible;
                if amount < min_required && !is_all_in {
                    return Err(GameError::invalid_action("raise below minimum"));
                }
                let increment = amount - self.max_bet;
                let pay = amount - seat.bet;
                let s = self.seats.get_mut(&seat_id).unwrap();
                s.stack -= pay;
                s.bet = amount;
                s.contributed += pay;
                if s.stack == 0 {
                    s.all_in = true;
                }
                self.max_bet = amount;
                // A short all-in raise (below the minimum) does not
                // reopen betting for callers who already matched the
                // previous maxBet; we implement this by keeping the
                // round-closing rule uniform (everyone still owing chips
                // must act again) without granting a fresh raising right
                // beyond matching the new amount — see DESIGN.md.
                if increment >= self.last_raise_increment || is_all_in {
                    self.last_raise_increment = self.last_raise_increment.max(increment.max(1));
                }
                self.need_to_act = self
                    .dealt_in_seats
                    .iter()
                    .copied()
                    .filter(|&s| s != seat_id && self.seats[&s].can_act())
                    .collect();
            }
        }

        self.need_to_act.remove(&seat_id);
        Ok(())
    }

    /// If only one non-folded seat remains, skip to award without a
    /// showdown (§4.3). Returns true if the hand ended this way.
    fn maybe_award_uncontested(&mut self) -> bool {
        let remaining: Vec<u8> = self
            .dealt_in_seats
            .iter()
            .copied()
            .filter(|s| !self.seats[s].folded)
            .collect();
        if remaining.len() != 1 || matches!(self.phase, Phase::Ended | Phase::Waiting) {
            return false;
        }
        self.settle_bets_into_pots();
        let winner = remaining[0];
        let total: i64 = self.pots.iter().map(|p| p.amount).sum();
        self.seats.get_mut(&winner).unwrap().stack += total;
        self.phase = Phase::Ended;
        self.current_seat = None;
        self.bump_seq();
        self.emit(
            EventType::HandComplete,
            json!({
                "hand_number": self.hand_number,
                "showdown": false,
                "winners": [{"seat_id": winner, "amount": total}],
            }),
        );
        true
    }

    /// Moves every seat's current-street `bet` into cumulative
    /// `contributed`, then rebuilds `self.pots` from contributions.
    fn settle_bets_into_pots(&mut self) {
        // `contributed` is already kept current by every action (blinds,
        // calls, raises); only the per-street `bet` needs clearing here.
        for seat in self.seats.values_mut() {
            seat.bet = 0;
        }
        let contributed: BTreeMap<u8, i64> = self
            .dealt_in_seats
            .iter()
            .map(|&s| (s, self.seats[&s].contributed))
            .collect();
        let folded: BTreeSet<u8> = self
            .dealt_in_seats
            .iter()
            .copied()
            .filter(|s| self.seats[s].folded)
            .collect();
        self.pots = pots::build_pots(&contributed, &folded);
    }

    fn advance_turn_or_close_round(&mut self) {
        if !self.need_to_act.is_empty() {
            self.current_seat = self.next_actor_in_ring().or_else(|| self.need_to_act.iter().next().copied());
            self.mint_turn_token();
            return;
        }
        self.close_betting_round();
    }

    /// Walks `dealt_in_seats` clockwise from `current_seat` to find the
    /// next seat still owing an action. `need_to_act` is a `BTreeSet` so
    /// it has no notion of seating order; picking its first element
    /// directly would jump to the numerically smallest pending seat
    /// instead of the next one around the table.
    fn next_actor_in_ring(&self) -> Option<u8> {
        let start = self.current_seat?;
        let ring = &self.dealt_in_seats;
        let mut seat = start;
        for _ in 0..ring.len() {
            seat = self.next_in(seat, ring)?;
            if self.need_to_act.contains(&seat) {
                return Some(seat);
            }
        }
        None
    }

    fn close_betting_round(&mut self) {
        self.settle_bets_into_pots();

        loop {
            let can_act_count = self
                .dealt_in_seats
                .iter()
                .filter(|s| !self.seats[s].folded && self.seats[s].can_act())
                .count();
            let contested = self.dealt_in_seats.iter().filter(|s| !self.seats[s].folded).count();

            match self.phase {
                Phase::Preflop => self.deal_street(Phase::Flop, 3),
                Phase::Flop => self.deal_street(Phase::Turn, 1),
                Phase::Turn => self.deal_street(Phase::River, 1),
                Phase::River => {
                    self.run_showdown();
                    return;
                }
                _ => return,
            }

            if contested <= 1 {
                continue;
            }
            if can_act_count >= 2 {
                self.max_bet = 0;
                self.last_raise_increment = self.config.big_blind;
                self.need_to_act = self
                    .dealt_in_seats
                    .iter()
                    .copied()
                    .filter(|s| self.seats[s].can_act())
                    .collect();
                self.current_seat = self.first_active_after_dealer();
                self.mint_turn_token();
                return;
            }
            // Fewer than 2 seats can still act: run the rest of the board
            // out with no further input (all-in runout, §4.3).
        }
    }

    fn deal_street(&mut self, new_phase: Phase, n: usize) {
        let cards = match self.deck.draw(n) {
            Ok(c) => c,
            Err(_) => {
                error!(table = %self.table_id, hand = self.hand_number, "deck exhausted dealing street");
                self.emit(
                    EventType::HandComplete,
                    json!({"error": "deck_exhausted"}),
                );
                self.phase = Phase::Ended;
                return;
            }
        };
        self.community_cards.extend(cards.iter().copied());
        self.phase = new_phase;
        self.bump_seq();
        self.emit(
            EventType::StreetDealt,
            json!({ "phase": phase_str(new_phase), "cards": cards }),
        );
    }

    fn first_active_after_dealer(&self) -> Option<u8> {
        let dealer = self.dealer_seat?;
        let mut ring = self.dealt_in_seats.clone();
        ring.sort_unstable();
        let start = ring.iter().position(|&s| s == dealer).unwrap_or(0);
        for i in 1..=ring.len() {
            let candidate = ring[(start + i) % ring.len()];
            if self.seats[&candidate].can_act() {
                return Some(candidate);
            }
        }
        None
    }

    fn run_showdown(&mut self) {
        self.phase = Phase::Showdown;
        let mut evaluations: BTreeMap<u8, Evaluation> = BTreeMap::new();
        for &seat_id in &self.dealt_in_seats {
            let seat = &self.seats[&seat_id];
            if seat.folded {
                continue;
            }
            let Some(hole) = seat.hole_cards else { continue };
            let mut cards: Vec<Card> = vec![hole[0], hole[1]];
            cards.extend(self.community_cards.iter().copied());
            evaluations.insert(seat_id, eval::evaluate(&cards));
        }

        let mut winners_payload = Vec::new();
        for pot in self.pots.clone() {
            let mut contenders: Vec<(u8, &Evaluation)> = pot
                .eligible_seats
                .iter()
                .filter_map(|s| evaluations.get(s).map(|e| (*s, e)))
                .collect();
            if contenders.is_empty() {
                continue;
            }
            contenders.sort_by(|a, b| Evaluation::compare(b.1, a.1).cmp(&0));
            let best = contenders[0].1.clone();
            let mut winning_seats: Vec<u8> = contenders
                .iter()
                .filter(|(_, e)| Evaluation::compare(e, &best) == 0)
                .map(|(s, _)| *s)
                .collect();
            winning_seats.sort_by_key(|&s| clockwise_distance(self.dealer_seat.unwrap_or(s), s, &self.dealt_in_seats));

            let share = pot.amount / winning_seats.len() as i64;
            let mut remainder = pot.amount - share * winning_seats.len() as i64;
            for &seat_id in &winning_seats {
                let mut amount = share;
                if remainder > 0 {
                    amount += 1;
                    remainder -= 1;
                }
                self.seats.get_mut(&seat_id).unwrap().stack += amount;
                winners_payload.push(json!({"seat_id": seat_id, "amount": amount}));
            }
        }

        self.bump_seq();
        self.emit(
            EventType::Showdown,
            json!({
                "hand_number": self.hand_number,
                "hands": evaluations
                    .iter()
                    .map(|(seat, e)| json!({"seat_id": seat, "category": e.category, "description": e.description}))
                    .collect::<Vec<_>>(),
            }),
        );
        self.phase = Phase::Ended;
        self.current_seat = None;
        self.bump_seq();
        self.emit(
            EventType::HandComplete,
            json!({
                "hand_number": self.hand_number,
                "showdown": true,
                "winners": winners_payload,
            }),
        );
    }

    // ---- C3: projections ----

    pub fn state_for_seat(&self, seat_id: u8) -> TableView {
        self.view(Some(seat_id))
    }

    pub fn public_state(&self) -> TableView {
        self.view(None)
    }

    /// Every hole card visible, regardless of seat. Reserved for the
    /// admin-credentialed observer path (§6 `showCards=true`).
    pub fn admin_state(&self) -> TableView {
        self.view_with(|_| true)
    }

    fn view(&self, viewer: Option<u8>) -> TableView {
        self.view_with(|seat_id| Some(seat_id) == viewer)
    }

    fn view_with(&self, reveal: impl Fn(u8) -> bool) -> TableView {
        let seats = self
            .seats
            .values()
            .map(|s| SeatView {
                seat_id: s.seat_id,
                agent_id: s.agent_id.clone(),
                agent_name: s.agent_name.clone(),
                stack: s.stack,
                bet: s.bet,
                folded: s.folded,
                all_in: s.all_in,
                hole_cards: if reveal(s.seat_id) { s.hole_cards } else { None },
            })
            .collect();

        let legal_actions = self.current_seat.map(|cs| self.legal_actions_for(cs));
        let to_call = self
            .current_seat
            .map(|cs| self.max_bet - self.seats[&cs].bet);
        let min_raise = self
            .current_seat
            .map(|_| (self.max_bet + self.last_raise_increment).max(2 * self.config.big_blind));
        let turn_token = self.current_seat.and_then(|cs| if reveal(cs) { self.turn_token.clone() } else { None });

        TableView {
            table_id: self.table_id.clone(),
            seq: self.seq,
            hand_number: self.hand_number,
            phase: self.phase,
            dealer_seat: self.dealer_seat,
            current_seat: self.current_seat,
            community_cards: self.community_cards.clone(),
            pots: self.pots.clone(),
            seats,
            to_call,
            min_raise,
            legal_actions,
            turn_token,
        }
    }

    /// Final stacks snapshot for persistence at `endTable` (§4.10).
    pub fn seat_stacks(&self) -> Vec<(u8, i64)> {
        self.seats.values().map(|s| (s.seat_id, s.stack)).collect()
    }

    pub fn seated_count(&self) -> usize {
        self.seats.values().filter(|s| s.is_active).count()
    }

    pub fn can_start(&self) -> bool {
        self.seats.values().filter(|s| s.is_active && s.stack > 0).count() >= 2
    }
}

fn clockwise_distance(dealer: u8, seat: u8, ring: &[u8]) -> usize {
    let mut sorted = ring.to_vec();
    sorted.sort_unstable();
    let start = sorted.iter().position(|&s| s == dealer).unwrap_or(0);
    sorted
        .iter()
        .position(|&s| s == seat)
        .map(|i| (i + sorted.len() - start) % sorted.len())
        .unwrap_or(usize::MAX)
}

fn action_kind_str(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Fold => "fold",
        ActionKind::Check => "check",
        ActionKind::Call => "call",
        ActionKind::RaiseTo => "raiseTo",
    }
}

fn phase_str(phase: Phase) -> &'static str {
    match phase {
        Phase::Waiting => "waiting",
        Phase::Preflop => "preflop",
        Phase::Flop => "flop",
        Phase::Turn => "turn",
        Phase::River => "river",
        Phase::Showdown => "showdown",
        Phase::Ended => "ended",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> TableConfig {
        TableConfig {
            small_blind: 1,
            big_blind: 2,
            max_seats: 9,
            initial_stack: 1000,
            action_timeout_ms: 30_000,
            min_players_to_start: 2,
        }
    }

    fn heads_up(seed: &str) -> TableRuntime {
        let mut rt = TableRuntime::new("t1".to_string(), cfg(), Some(seed.to_string()));
        rt.add_player(0, "a0".into(), "Alice".into(), 1000).unwrap();
        rt.add_player(1, "a1".into(), "Bob".into(), 1000).unwrap();
        rt.drain_events();
        rt
    }

    // S1 — heads-up, fold preflop.
    #[test]
    fn s1_heads_up_fold_preflop() {
        let mut rt = heads_up("t1");
        assert!(rt.start_hand().unwrap());
        assert_eq!(rt.seats[&0].bet, 1);
        assert_eq!(rt.seats[&1].bet, 2);
        let current = rt.current_seat.unwrap();
        assert_eq!(current, 0);
        let token = rt.turn_token.clone().unwrap();

        let outcome = rt
            .apply_action(
                0,
                ActionRequest {
                    turn_token: token,
                    kind: ActionKind::Fold,
                    amount: None,
                },
            )
            .unwrap();
        assert!(matches!(outcome, ActionOutcome::Applied { .. }));
        assert_eq!(rt.phase, Phase::Ended);
        assert_eq!(rt.seats[&0].stack, 999);
        assert_eq!(rt.seats[&1].stack, 1001);
    }

    // S2 — turn-token replay.
    #[test]
    fn s2_turn_token_replay_is_idempotent() {
        let mut rt = heads_up("t1");
        rt.start_hand().unwrap();
        let token = rt.turn_token.clone().unwrap();
        let req = ActionRequest {
            turn_token: token,
            kind: ActionKind::Call,
            amount: None,
        };
        let first = rt.apply_action(0, req.clone()).unwrap();
        let second = rt.apply_action(0, req).unwrap();
        match (first, second) {
            (ActionOutcome::Applied { seq: a }, ActionOutcome::Duplicate { seq: b }) => {
                assert_eq!(a, b);
            }
            other => panic!("expected applied-then-duplicate, got {other:?}"),
        }
    }

    // S4 — side pot on all-in (3 seats: 100, 500, 500).
    #[test]
    fn s4_side_pot_on_all_in() {
        let mut rt = TableRuntime::new("t4".to_string(), cfg(), Some("s4".to_string()));
        rt.add_player(0, "a0".into(), "A".into(), 100).unwrap();
        rt.add_player(1, "a1".into(), "B".into(), 500).unwrap();
        rt.add_player(2, "a2".into(), "C".into(), 500).unwrap();
        rt.drain_events();
        rt.start_hand().unwrap();

        // dealer=0, sb=1, bb=2, first to act = seat after bb = 0. Seat 0
        // shoves its entire 100-chip stack; everyone else just calls.
        let mut shoved = false;
        for _ in 0..50 {
            let Some(cur) = rt.current_seat else { break };
            let seat = &rt.seats[&cur];
            let to_call = rt.max_bet - seat.bet;
            let token = rt.turn_token.clone().unwrap();
            let req = if !shoved && cur == 0 {
                shoved = true;
                ActionRequest {
                    turn_token: token,
                    kind: ActionKind::RaiseTo,
                    amount: Some(seat.bet + seat.stack),
                }
            } else if to_call == 0 {
                ActionRequest { turn_token: token, kind: ActionKind::Check, amount: None }
            } else {
                ActionRequest { turn_token: token, kind: ActionKind::Call, amount: None }
            };
            rt.apply_action(cur, req).unwrap();
            if rt.phase == Phase::Ended {
                break;
            }
        }
        assert!(shoved);

        let total_stacks: i64 = rt.seats.values().map(|s| s.stack).sum();
        assert_eq!(total_stacks, 1100);
    }

    #[test]
    fn legality_closure_never_mutates_on_error() {
        let mut rt = heads_up("t1");
        rt.start_hand().unwrap();
        let before_bet0 = rt.seats[&0].bet;
        let before_seq = rt.seq;
        let err = rt
            .apply_action(
                0,
                ActionRequest {
                    turn_token: "not-the-real-token".to_string(),
                    kind: ActionKind::Call,
                    amount: None,
                },
            )
            .unwrap_err();
        assert_eq!(err, GameError::StaleToken);
        assert_eq!(rt.seats[&0].bet, before_bet0);
        assert_eq!(rt.seq, before_seq);
    }

    #[test]
    fn chip_conservation_across_a_full_hand() {
        let mut rt = heads_up("chips");
        let starting_total: i64 = rt.seats.values().map(|s| s.stack).sum();
        rt.start_hand().unwrap();
        for _ in 0..20 {
            let Some(cur) = rt.current_seat else { break };
            let token = rt.turn_token.clone().unwrap();
            let seat = &rt.seats[&cur];
            let to_call = rt.max_bet - seat.bet;
            let req = if to_call == 0 {
                ActionRequest { turn_token: token, kind: ActionKind::Check, amount: None }
            } else {
                ActionRequest { turn_token: token, kind: ActionKind::Call, amount: None }
            };
            rt.apply_action(cur, req).unwrap();
            if rt.phase == Phase::Ended {
                break;
            }
        }
        let total: i64 = rt.seats.values().map(|s| s.stack + s.bet).sum::<i64>()
            + rt.pots.iter().map(|p| p.amount).sum::<i64>();
        assert_eq!(total, starting_total);
    }

    // Turn order must follow the seating ring from `current_seat`, not the
    // numerically smallest pending seat id in `need_to_act`. A dealer that
    // isn't seat 0 (here seat 2, with sb=3, bb=0) exercises this: UTG is
    // seat 1, and the remaining order should be 2 (dealer), then 3 (sb),
    // then 0 (bb), never jumping straight from 1 to 0.
    #[test]
    fn four_handed_turn_order_follows_the_ring_not_seat_number() {
        let mut rt = TableRuntime::new("t-ring".to_string(), cfg(), Some("ring".to_string()));
        for seat_id in 0..4u8 {
            rt.add_player(seat_id, format!("a{seat_id}"), format!("P{seat_id}"), 1000).unwrap();
        }
        rt.drain_events();
        // Previous dealer was seat 1, so start_hand rotates the button to seat 2.
        rt.dealer_seat = Some(1);
        rt.start_hand().unwrap();

        assert_eq!(rt.dealer_seat, Some(2));
        assert_eq!(rt.seats[&3].bet, 1); // small blind
        assert_eq!(rt.seats[&0].bet, 2); // big blind

        let mut acting_order = Vec::new();
        for _ in 0..4 {
            let Some(cur) = rt.current_seat else { break };
            acting_order.push(cur);
            let token = rt.turn_token.clone().unwrap();
            let to_call = rt.max_bet - rt.seats[&cur].bet;
            let req = if to_call == 0 {
                ActionRequest { turn_token: token, kind: ActionKind::Check, amount: None }
            } else {
                ActionRequest { turn_token: token, kind: ActionKind::Call, amount: None }
            };
            rt.apply_action(cur, req).unwrap();
        }

        assert_eq!(acting_order, vec![1, 2, 3, 0]);
        assert_eq!(rt.phase, Phase::Flop);
    }
}
