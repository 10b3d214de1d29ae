//! Corrélateur d'heure de fix et publicateur (§4.5).
//!
//! Apparie un front d'impulsion accepté avec la dernière heure de fix
//! GPS dans la bande pour déduire l'instant UTC vrai du front, puis
//! exécute les vérifications de cohérence et transmet le résultat au
//! chemin de publication du contexte. Logique de décision pure plus le
//! seul champ de `ClassifierState` (`last_second_used`) dont elle a
//! besoin pour la déduplication par seconde ; aucune E/S propre.

use crate::classifier::{Accepted, ClassifierState, PulseKind};
use crate::context::MonitorContext;
use crate::error::RejectReason;
use crate::hooks::{LogLevel, TimeDelta};
use crate::timespec::Timespec;

/// Rejette un front dont le délai par rapport au dernier fix dépasse
/// cette borne (§4.5 "more than 1.1 s after the fix it was stashed
/// with is stale").
const MAX_FIX_DELAY: Timespec = Timespec { sec: 1, nsec: 100_000_000 };

/// Corrèle une impulsion acceptée avec la dernière heure de fix
/// mémorisée et, si elle passe toutes les vérifications de cohérence,
/// la publie via `context`.
///
/// `clock_ts` est la lecture de l'horloge temps réel de l'hôte
/// appariée au front (`clock_ts` en espace utilisateur, ou
/// l'horodatage noyau une fois que la règle de sélection du front final
/// l'a déjà choisi). Renvoie le nouveau compteur de publication en cas
/// de succès, ou la raison pour laquelle le front a été abandonné.
pub fn correlate(
    state: &mut ClassifierState,
    context: &MonitorContext,
    accepted: Accepted,
    clock_ts: Timespec,
) -> Result<u64, RejectReason> {
    if accepted.kind == PulseKind::FiveHz {
        // Le cas 5 Hz n'a aucun moyen fiable de déduire tv_nsec d'un
        // fix qui ne porte que des secondes entières (§9 "5 Hz Open
        // Question") ; la publication est désactivée plutôt que
        // devinée.
        return Err(RejectReason::FiveHzPublicationDisabled);
    }

    let fixin = context.copy_out_fixtime();

    // Heure vraie déduite du fix (§4.5 "true-time inference") :
    // l'impulsion marque le début de la seconde *suivant* le fix avec
    // lequel elle a été mémorisée, jamais la seconde du fix lui-même.
    let real = Timespec::new(fixin.real.sec + 1, 0);

    let delay = clock_ts.sub(fixin.clock);
    if delay.sec < 0 || (delay.sec == 0 && delay.nsec < 0) {
        return Err(RejectReason::ClockWentBackwards);
    }
    if delay.sec > MAX_FIX_DELAY.sec || (delay.sec == MAX_FIX_DELAY.sec && delay.nsec >= MAX_FIX_DELAY.nsec) {
        return Err(RejectReason::TimestampOutOfRange);
    }

    if state.last_second_used == Some(real.sec) {
        return Err(RejectReason::SecondAlreadyHandled);
    }
    state.last_second_used = Some(real.sec);

    let delta = TimeDelta { real, clock: clock_ts };

    if let Some(tag) = context.hooks.report(&delta) {
        context.hooks.log(LogLevel::Prog, &tag);
    }
    context.hooks.publish(&delta);

    Ok(context.publish_locked(delta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::TracingHooks;

    fn fresh_context() -> MonitorContext {
        MonitorContext::new(-1, "test0", Box::new(TracingHooks))
    }

    fn accepted(kind: PulseKind) -> Accepted {
        Accepted { kind, duration_us: 500_000 }
    }

    #[test]
    fn five_hz_publication_always_disabled() {
        let mut state = ClassifierState::default();
        let context = fresh_context();
        let result = correlate(&mut state, &context, accepted(PulseKind::FiveHz), Timespec::new(100, 0));
        assert_eq!(result, Err(RejectReason::FiveHzPublicationDisabled));
    }

    #[test]
    fn clean_pulse_publishes_next_second() {
        let mut state = ClassifierState::default();
        let context = fresh_context();
        context.stash_fixtime(Timespec::new(999, 0), Timespec::new(999, 50_000_000));

        let clock_ts = Timespec::new(1000, 0);
        let result = correlate(&mut state, &context, accepted(PulseKind::OneHzSquare), clock_ts);

        assert_eq!(result, Ok(1));
        let snap = context.lastpps();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.delta.real, Timespec::new(1000, 0));
        assert_eq!(snap.delta.clock, clock_ts);
    }

    #[test]
    fn same_second_twice_is_deduped() {
        let mut state = ClassifierState::default();
        let context = fresh_context();
        context.stash_fixtime(Timespec::new(999, 0), Timespec::new(999, 50_000_000));

        let clock_ts = Timespec::new(1000, 0);
        assert!(correlate(&mut state, &context, accepted(PulseKind::OneHzSquare), clock_ts).is_ok());

        let result = correlate(&mut state, &context, accepted(PulseKind::OneHzSquare), Timespec::new(1000, 10_000));
        assert_eq!(result, Err(RejectReason::SecondAlreadyHandled));
    }

    #[test]
    fn clock_went_backwards_is_rejected() {
        let mut state = ClassifierState::default();
        let context = fresh_context();
        context.stash_fixtime(Timespec::new(999, 0), Timespec::new(999, 500_000_000));

        let clock_ts = Timespec::new(999, 400_000_000);
        let result = correlate(&mut state, &context, accepted(PulseKind::OneHzSquare), clock_ts);
        assert_eq!(result, Err(RejectReason::ClockWentBackwards));
    }

    #[test]
    fn delay_just_under_bound_accepted() {
        let mut state = ClassifierState::default();
        let context = fresh_context();
        context.stash_fixtime(Timespec::new(999, 0), Timespec::new(999, 0));

        let clock_ts = Timespec::new(1000, 99_999_999);
        let result = correlate(&mut state, &context, accepted(PulseKind::OneHzSquare), clock_ts);
        assert_eq!(result, Ok(1));
    }

    #[test]
    fn delay_at_bound_rejected_as_stale() {
        let mut state = ClassifierState::default();
        let context = fresh_context();
        context.stash_fixtime(Timespec::new(999, 0), Timespec::new(999, 0));

        let clock_ts = Timespec::new(1000, 100_000_000);
        let result = correlate(&mut state, &context, accepted(PulseKind::OneHzSquare), clock_ts);
        assert_eq!(result, Err(RejectReason::TimestampOutOfRange));
    }
}
