//! Classificateur de fronts / validateur d'impulsion (§4.4).
//!
//! Table de décision pure plus l'état privé du worker qui la traverse
//! (`pulse[]`, `kpps_pulse[]`, `state_last`, `unchanged_count`). Tout
//! ici est exempt d'E/S afin de pouvoir être exercé directement avec
//! les valeurs limites du §8.

use crate::capture::Polarity;
use crate::error::RejectReason;
use crate::timespec::Timespec;

/// Combien de réveils consécutifs à état inchangé déclenchent la pause
/// de refroidissement (§3 `unchanged_count`, §4.4 "at 10 log a warning,
/// sleep 10 s").
pub const STUCK_THRESHOLD: u32 = 10;
pub const STUCK_COOLDOWN_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseKind {
    FiveHz,
    OneHzSquare,
    OneHzLeadingEdge,
    OneHzInvisible,
    HalfHzSquare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub kind: PulseKind,
    pub duration_us: i64,
}

/// État privé du worker transporté entre itérations (§3 "Classifier
/// state"). Non partagé avec aucun autre thread.
///
/// Le bitmap de ligne modem lui-même (§3 `state_last`) appartient à
/// `UserEdgeWaiter`, seul composant qui le lit — cette structure n'a
/// besoin que des valeurs précédente/courante passées en argument pour
/// la vérification de blocage, pas d'une copie persistante à elle.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierState {
    pub unchanged_count: u32,
    pub pulse: [Timespec; 2],
    pub kpps_pulse: [Timespec; 2],
    pub last_second_used: Option<i64>,
}

impl Default for ClassifierState {
    fn default() -> Self {
        ClassifierState {
            unchanged_count: 0,
            pulse: [Timespec::ZERO; 2],
            kpps_pulse: [Timespec::ZERO; 2],
            last_second_used: None,
        }
    }
}

/// Ce que le worker doit faire après une passe du classificateur.
pub enum ClassifyOutcome {
    Accept(Accepted),
    Reject(RejectReason),
    /// Refroidissement de ligne bloquée déclenché ; le worker doit
    /// dormir `STUCK_COOLDOWN_SECS` et remettre le compteur à zéro
    /// (§4.4).
    EnterCooldown,
    /// Réveil à état inchangé, pas encore au seuil de blocage ; ignorer
    /// cette itération sans mettre à jour `pulse[]`.
    SkipUnchanged,
}

/// Classifie un front selon le cycle/la durée qu'il implique vis-à-vis
/// de `state.pulse[]`, en appliquant d'abord le traitement d'état
/// bloqué (§4.4).
///
/// `now` est l'horodatage de capture (`clock_ts` en espace utilisateur
/// ou, une fois la règle de sélection du front final du §4.4 déjà
/// appliquée, l'horodatage noyau choisi). `state_raw`/`state_last_raw`
/// sont les bitmaps modem *non masqués* pour que la comparaison d'état
/// bloqué corresponde au réveil complet, pas seulement au
/// sous-ensemble des lignes surveillées.
pub fn classify(
    state: &mut ClassifierState,
    now: Timespec,
    edge: Polarity,
    state_raw: i32,
    state_last_raw: i32,
) -> ClassifyOutcome {
    if state_raw == state_last_raw {
        let cycle_us = now.diff_us(state.pulse[edge.index()]);
        if cycle_us > 999_000 && cycle_us < 1_001_000 {
            // Impulsion invisible : trop courte pour avoir été
            // échantillonnée par TIOCMIWAIT, mais le cycle indique
            // qu'elle a eu lieu.
            state.unchanged_count = 0;
            let outcome = decide(cycle_us, 0, edge);
            state.pulse[edge.index()] = now;
            return outcome;
        }

        state.unchanged_count += 1;
        if state.unchanged_count >= STUCK_THRESHOLD {
            state.unchanged_count = 1;
            return ClassifyOutcome::EnterCooldown;
        }
        return ClassifyOutcome::SkipUnchanged;
    }

    let cycle_us = now.diff_us(state.pulse[edge.index()]);
    let duration_us = now.diff_us(state.pulse[edge.other().index()]);
    let outcome = decide(cycle_us, duration_us, edge);

    state.pulse[edge.index()] = now;

    outcome
}

/// La table de classification elle-même (§4.4), pure et sans effet de
/// bord.
fn decide(cycle_us: i64, duration_us: i64, edge: Polarity) -> ClassifyOutcome {
    use ClassifyOutcome::{Accept, Reject};
    use RejectReason::*;

    if cycle_us < 0 {
        return Reject(NegativeCycle);
    }
    if cycle_us < 199_000 {
        return Reject(TooShortFor5Hz);
    }
    if cycle_us < 201_000 {
        return if duration_us < 100_000 {
            Accept(Accepted { kind: PulseKind::FiveHz, duration_us })
        } else {
            Reject(Rejected5HzDuration)
        };
    }
    if cycle_us < 900_000 {
        return Reject(InFiveToOneHzGap);
    }
    if cycle_us < 1_100_000 {
        if duration_us == 0 {
            return Accept(Accepted { kind: PulseKind::OneHzInvisible, duration_us });
        }
        if duration_us < 499_000 {
            return Reject(OneHzTrailingEdge);
        }
        if duration_us < 501_000 {
            return if edge == Polarity::Assert {
                Accept(Accepted { kind: PulseKind::OneHzSquare, duration_us })
            } else {
                Reject(OneHzSquareWrongEdge)
            };
        }
        return Accept(Accepted { kind: PulseKind::OneHzLeadingEdge, duration_us });
    }
    if cycle_us < 1_999_000 {
        return Reject(InOneToHalfHzGap);
    }
    if cycle_us < 2_001_000 {
        return if (999_000..1_001_000).contains(&duration_us) {
            Accept(Accepted { kind: PulseKind::HalfHzSquare, duration_us })
        } else {
            Reject(RejectedHalfHzDuration)
        };
    }
    Reject(TooLongForHalfHz)
}

/// Le classificateur parallèle du chemin noyau (§4.4 "Kernel path
/// parallel classifier") : seul le 1 Hz est validé ainsi pour
/// l'instant, et l'acceptation se décide uniquement sur le cycle
/// puisque les impulsions capturées par le noyau ont une gigue
/// négligeable.
pub fn classify_kpps(state: &mut ClassifierState, now: Timespec, edge: Polarity) -> bool {
    let cycle_us = now.diff_us(state.kpps_pulse[edge.index()]);
    state.kpps_pulse[edge.index()] = now;
    cycle_us > 990_000 && cycle_us < 1_010_000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_state() -> ClassifierState {
        ClassifierState::default()
    }

    #[test]
    fn boundary_5hz_accept() {
        match decide(200_999, 99_999, Polarity::Assert) {
            ClassifyOutcome::Accept(a) => assert_eq!(a.kind, PulseKind::FiveHz),
            _ => panic!("expected accept"),
        }
    }

    #[test]
    fn boundary_5hz_reject_at_201000() {
        match decide(201_000, 50_000, Polarity::Assert) {
            ClassifyOutcome::Reject(RejectReason::InFiveToOneHzGap) => {}
            other => panic!("expected gap reject, got {:?}", debug_outcome(&other)),
        }
    }

    #[test]
    fn one_hz_square_edge_matters() {
        match decide(1_000_000, 500_000, Polarity::Clear) {
            ClassifyOutcome::Reject(RejectReason::OneHzSquareWrongEdge) => {}
            other => panic!("expected wrong-edge reject, got {:?}", debug_outcome(&other)),
        }
        match decide(1_000_000, 500_000, Polarity::Assert) {
            ClassifyOutcome::Accept(a) => assert_eq!(a.kind, PulseKind::OneHzSquare),
            other => panic!("expected accept, got {:?}", debug_outcome(&other)),
        }
    }

    #[test]
    fn half_hz_square_window() {
        match decide(2_000_000, 1_000_000, Polarity::Assert) {
            ClassifyOutcome::Accept(a) => assert_eq!(a.kind, PulseKind::HalfHzSquare),
            other => panic!("expected accept, got {:?}", debug_outcome(&other)),
        }
        match decide(2_000_000, 900_000, Polarity::Assert) {
            ClassifyOutcome::Reject(RejectReason::RejectedHalfHzDuration) => {}
            other => panic!("expected reject, got {:?}", debug_outcome(&other)),
        }
    }

    #[test]
    fn negative_cycle_rejected() {
        match decide(-1, 0, Polarity::Assert) {
            ClassifyOutcome::Reject(RejectReason::NegativeCycle) => {}
            other => panic!("expected reject, got {:?}", debug_outcome(&other)),
        }
    }

    #[test]
    fn stuck_state_cooldown_at_threshold() {
        let mut state = fresh_state();
        state.unchanged_count = STUCK_THRESHOLD - 1;
        let now = Timespec::new(100, 0);
        // le cycle depuis pulse[] à ZERO sera énorme, bien en dehors de
        // la fenêtre d'impulsion invisible, donc cela doit dépasser le
        // seuil.
        match classify(&mut state, now, Polarity::Assert, 5, 5) {
            ClassifyOutcome::EnterCooldown => {}
            _ => panic!("expected cooldown"),
        }
        assert_eq!(state.unchanged_count, 1);
    }

    #[test]
    fn invisible_pulse_resets_unchanged_count() {
        let mut state = fresh_state();
        state.unchanged_count = 3;
        state.pulse[Polarity::Assert.index()] = Timespec::new(100, 0);
        let now = Timespec::new(101, 0);
        match classify(&mut state, now, Polarity::Assert, 5, 5) {
            ClassifyOutcome::Accept(a) => assert_eq!(a.kind, PulseKind::OneHzInvisible),
            other => panic!("expected accept, got {:?}", debug_outcome(&other)),
        }
        assert_eq!(state.unchanged_count, 0);
    }

    #[test]
    fn kpps_classifier_window() {
        let mut state = fresh_state();
        state.kpps_pulse[Polarity::Assert.index()] = Timespec::new(0, 0);
        assert!(classify_kpps(&mut state, Timespec::new(1, 0), Polarity::Assert));

        let mut state = fresh_state();
        state.kpps_pulse[Polarity::Assert.index()] = Timespec::new(0, 0);
        assert!(!classify_kpps(&mut state, Timespec::new(1, 50_000_000), Polarity::Assert));
    }

    fn debug_outcome(outcome: &ClassifyOutcome) -> &'static str {
        match outcome {
            ClassifyOutcome::Accept(_) => "accept",
            ClassifyOutcome::Reject(_) => "reject",
            ClassifyOutcome::EnterCooldown => "cooldown",
            ClassifyOutcome::SkipUnchanged => "skip",
        }
    }
}
