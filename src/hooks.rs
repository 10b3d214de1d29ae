//! L'ensemble de capacités qu'un `MonitorContext` expose à son worker
//! (§3, §6).
//!
//! La source dont ceci s'inspire écrase les champs de pointeurs de
//! fonction avec null pour signaler l'arrêt, ce qui entre en course
//! avec un worker qui lit ces mêmes champs sur son chemin critique.
//! Ici l'arrêt passe par un `AtomicBool` dédié sur `MonitorContext`
//! (voir `context.rs`) ; les hooks sont un `Box<dyn MonitorHooks>`
//! jamais modifié après `activate`.

use crate::timespec::Timespec;

/// Niveaux de sévérité du §6. Associés aux macros `tracing` par
/// `TracingHooks`, l'implémentation par défaut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Inf,
    Prog,
    Raw,
}

/// L'instant UTC vrai d'une impulsion acceptée, apparié à la lecture de
/// l'horloge temps réel de l'hôte au moment de la capture (§3 TimeDelta).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeDelta {
    pub real: Timespec,
    pub clock: Timespec,
}

impl TimeDelta {
    /// `real - clock`, le décalage instantané exposé aux consommateurs.
    pub fn offset(&self) -> Timespec {
        self.real.sub(self.clock)
    }
}

/// Hooks sortants qu'un démon fournit à une instance de moniteur. Doit
/// être `Send + Sync` : le thread worker les appelle pendant que les
/// autres threads du démon continuent de tourner.
pub trait MonitorHooks: Send + Sync {
    /// Sortie de diagnostic non bloquante et thread-safe.
    fn log(&self, level: LogLevel, message: &str);

    /// Appelé une fois par impulsion acceptée, avant `publish`. Peut
    /// renvoyer une courte étiquette lisible qui n'enrichit que les
    /// logs ; son propre échec n'est pas fatal (§4.5).
    fn report(&self, delta: &TimeDelta) -> Option<String> {
        let _ = delta;
        None
    }

    /// Appelé une fois par impulsion acceptée — le terminus pour les
    /// consommateurs de temps en aval (démons de distribution de temps,
    /// segments de mémoire partagée).
    fn publish(&self, delta: &TimeDelta);

    /// Appelé une fois à la sortie du worker, pour le nettoyage. Par
    /// défaut un no-op, équivalent à un hook `wrap` nul dans la
    /// conception d'origine.
    fn wrap(&self) {}
}

/// Hooks par défaut : journalise via `tracing`, ne publie nulle part.
/// Destiné au binaire de démonstration et aux tests qui ne se
/// préoccupent que des logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHooks;

impl MonitorHooks for TracingHooks {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => tracing::error!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Inf => tracing::info!("{message}"),
            LogLevel::Prog => tracing::debug!("{message}"),
            LogLevel::Raw => tracing::trace!("{message}"),
        }
    }

    fn publish(&self, delta: &TimeDelta) {
        tracing::info!(
            real = %delta.real,
            clock = %delta.clock,
            offset = %delta.offset(),
            "pulse published"
        );
    }
}
