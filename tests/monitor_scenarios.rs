//! Scénarios de bout en bout pour le pipeline classify -> correlate,
//! pilotés avec des fronts synthétiques plutôt qu'un vrai tty (§8).

use pps_monitor::capture::Polarity;
use pps_monitor::classifier::{self, ClassifierState, ClassifyOutcome};
use pps_monitor::context::MonitorContext;
use pps_monitor::correlator;
use pps_monitor::hooks::{LogLevel, MonitorHooks, TimeDelta};
use pps_monitor::{RejectReason, Timespec};
use std::sync::{Arc, Mutex};

/// Enregistre chaque publication et ligne de log au lieu de les
/// envoyer quelque part, pour que les scénarios puissent vérifier ce
/// que le pipeline a décidé.
#[derive(Default)]
struct RecordingHooks {
    published: Mutex<Vec<TimeDelta>>,
    logs: Mutex<Vec<(LogLevel, String)>>,
}

impl MonitorHooks for RecordingHooks {
    fn log(&self, level: LogLevel, message: &str) {
        self.logs.lock().unwrap().push((level, message.to_string()));
    }

    fn publish(&self, delta: &TimeDelta) {
        self.published.lock().unwrap().push(*delta);
    }
}

fn new_context() -> Arc<MonitorContext> {
    Arc::new(MonitorContext::new(-1, "test0", Box::new(RecordingHooks::default())))
}

/// Fait passer un réveil par `classify` puis, s'il est accepté, par
/// `correlate`.
fn step(
    state: &mut ClassifierState,
    context: &MonitorContext,
    now: Timespec,
    edge: Polarity,
    raw: i32,
    raw_last: i32,
) -> Result<Option<u64>, RejectReason> {
    match classifier::classify(state, now, edge, raw, raw_last) {
        ClassifyOutcome::Accept(accepted) => correlator::correlate(state, context, accepted, now).map(Some),
        ClassifyOutcome::Reject(reason) => Err(reason),
        ClassifyOutcome::EnterCooldown => Err(RejectReason::StuckLine),
        ClassifyOutcome::SkipUnchanged => Ok(None),
    }
}

#[test]
fn one_hz_narrow_pulse_publishes_via_leading_edge() {
    let context = new_context();
    let mut state = ClassifierState::default();
    state.pulse[Polarity::Assert.index()] = Timespec::new(999, 0);
    state.pulse[Polarity::Clear.index()] = Timespec::new(998, 900_000_000);

    // Un rebond de 50 ms juste après l'assert précédent : trop court
    // pour quoi que ce soit, rejeté, mais il fait quand même avancer
    // `pulse[Clear]`.
    let bounce = step(&mut state, &context, Timespec::new(999, 50_000_000), Polarity::Clear, 0, 1);
    assert_eq!(bounce, Err(RejectReason::TooShortFor5Hz));

    context.stash_fixtime(Timespec::new(999, 0), Timespec::new(999, 0));
    let result = step(&mut state, &context, Timespec::new(1000, 0), Polarity::Assert, 1, 0);
    assert_eq!(result, Ok(Some(1)));
}

#[test]
fn one_hz_square_assert_only_publishes() {
    let context = new_context();
    let mut state = ClassifierState::default();
    state.pulse[Polarity::Assert.index()] = Timespec::new(999, 0);
    state.pulse[Polarity::Clear.index()] = Timespec::new(999, 500_000_000);

    context.stash_fixtime(Timespec::new(999, 0), Timespec::new(999, 0));
    let first = step(&mut state, &context, Timespec::new(1000, 0), Polarity::Assert, 1, 0);
    assert_eq!(first, Ok(Some(1)));

    let wrong_edge = step(&mut state, &context, Timespec::new(1000, 500_000_000), Polarity::Clear, 0, 1);
    assert_eq!(wrong_edge, Err(RejectReason::OneHzSquareWrongEdge));

    context.stash_fixtime(Timespec::new(1000, 0), Timespec::new(1000, 0));
    let second = step(&mut state, &context, Timespec::new(1001, 0), Polarity::Assert, 1, 0);
    assert_eq!(second, Ok(Some(2)));
}

#[test]
fn invisible_pulse_still_accepted() {
    let context = new_context();
    context.stash_fixtime(Timespec::new(999, 0), Timespec::new(999, 0));
    let mut state = ClassifierState::default();
    state.pulse[Polarity::Assert.index()] = Timespec::new(999, 0);

    // Même bitmap brut les deux fois : la ligne n'a jamais visiblement
    // basculé, mais le cycle par rapport au dernier assert indique
    // qu'une seconde complète s'est écoulée.
    let result = step(&mut state, &context, Timespec::new(1000, 0), Polarity::Assert, 5, 5);
    assert_eq!(result, Ok(Some(1)));
}

#[test]
fn stuck_line_enters_cooldown() {
    let context = new_context();
    let mut state = ClassifierState::default();
    state.pulse[Polarity::Assert.index()] = Timespec::new(0, 0);

    // Dix réveils consécutifs sans changement de bitmap ni cycle 1 Hz
    // plausible : chacun fait monter `unchanged_count` jusqu'à ce que
    // le seuil se déclenche.
    let mut last_result = Ok(None);
    for i in 1..=10 {
        last_result = step(&mut state, &context, Timespec::new(i * 3, 0), Polarity::Assert, 5, 5);
    }
    assert_eq!(last_result, Err(RejectReason::StuckLine));
}

#[test]
fn stale_fix_is_rejected() {
    let context = new_context();
    let mut state = ClassifierState::default();
    state.pulse[Polarity::Assert.index()] = Timespec::new(999, 0);
    state.pulse[Polarity::Clear.index()] = Timespec::new(998, 0);

    // Fix mémorisé longtemps avant l'arrivée de l'impulsion : le délai
    // dépasse la borne de péremption de 1,1 s.
    context.stash_fixtime(Timespec::new(990, 0), Timespec::new(990, 0));

    let result = step(&mut state, &context, Timespec::new(1000, 0), Polarity::Assert, 1, 0);
    assert_eq!(result, Err(RejectReason::TimestampOutOfRange));
}

#[test]
fn same_second_is_deduped_across_backends() {
    let context = new_context();
    let mut state = ClassifierState::default();
    state.pulse[Polarity::Assert.index()] = Timespec::new(999, 0);
    state.pulse[Polarity::Clear.index()] = Timespec::new(998, 0);

    context.stash_fixtime(Timespec::new(999, 0), Timespec::new(999, 0));
    let first = step(&mut state, &context, Timespec::new(1000, 0), Polarity::Assert, 1, 0);
    assert_eq!(first, Ok(Some(1)));

    // Un second front, accepté indépendamment, qui déduit la même
    // seconde UTC (le fix n'a pas encore dépassé 999) ne doit pas
    // publier deux fois, quel que soit le backend qui l'a produit.
    state.pulse[Polarity::Assert.index()] = Timespec::new(999, 900_000_000);
    state.pulse[Polarity::Clear.index()] = Timespec::new(998, 900_000_000);
    context.stash_fixtime(Timespec::new(999, 800_000_000), Timespec::new(1000, 800_000_000));

    let second = step(&mut state, &context, Timespec::new(1000, 900_000_000), Polarity::Clear, 0, 1);
    assert_eq!(second, Err(RejectReason::SecondAlreadyHandled));
}
