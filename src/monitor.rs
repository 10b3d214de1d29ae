//! Contrôleur de cycle de vie : possède le thread worker, pilote le
//! waiter en espace utilisateur et la source noyau optionnelle à
//! travers le classificateur et le corrélateur, et démonte tout à
//! l'arrêt (§4.6, §5, §6).

use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::capture::kernel::KernelPpsSource;
use crate::capture::userspace::UserEdgeWaiter;
use crate::capture::{CaptureMode, EdgeCapture};
use crate::classifier::{self, ClassifierState, ClassifyOutcome, STUCK_COOLDOWN_SECS};
use crate::context::MonitorContext;
use crate::correlator;
use crate::error::{MonitorError, RejectReason};
use crate::hooks::LogLevel;

/// Un moniteur en cours d'exécution : le thread worker plus le
/// contexte qu'il partage avec le reste du démon. Le détruire sans
/// appeler `deactivate` au préalable laisse le worker tourner jusqu'à
/// la fin du processus — les appelants qui ont besoin d'un arrêt
/// déterministe doivent l'appeler.
pub struct Monitor {
    context: Arc<MonitorContext>,
    worker: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Démarre le thread worker (§4.6 "activate"). `waiter` a déjà
    /// ouvert le tty et émis son premier `TIOCMGET` ; `kernel` vaut
    /// `Some` uniquement si la mise en place du PPS noyau (§4.2) a
    /// réussi pour ce périphérique.
    ///
    /// Échoue en amont (§7 "Setup-fatal") si `device_fd` ne désigne pas
    /// un tty — §3 exige que ce descripteur en soit un.
    pub fn activate(
        context: Arc<MonitorContext>,
        waiter: UserEdgeWaiter,
        kernel: Option<KernelPpsSource>,
    ) -> Result<Self, MonitorError> {
        if !is_tty(context.device_fd) {
            return Err(MonitorError::NotATty { device: context.device_name.clone() });
        }

        context.set_running(true);

        let worker_context = Arc::clone(&context);
        let worker = thread::spawn(move || run(worker_context, waiter, kernel));

        Ok(Monitor { context, worker: Some(worker) })
    }

    /// Signale au worker de s'arrêter et attend sa sortie (§4.6
    /// "deactivate"). Idempotent : appeler ceci deux fois est un
    /// no-op la seconde fois.
    pub fn deactivate(&mut self) {
        self.context.set_running(false);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    pub fn context(&self) -> &Arc<MonitorContext> {
        &self.context
    }
}

#[cfg(unix)]
fn is_tty(fd: RawFd) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

#[cfg(not(unix))]
fn is_tty(_fd: RawFd) -> bool {
    false
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.deactivate();
    }
}

/// La boucle du worker elle-même (§4.6). Tourne jusqu'à ce que
/// `context.is_running()` devienne faux, ce qui ne se produit que via
/// `deactivate`.
fn run(context: Arc<MonitorContext>, mut waiter: UserEdgeWaiter, mut kernel: Option<KernelPpsSource>) {
    let mut state = ClassifierState::default();

    while context.is_running() {
        let state_last_raw = waiter.state_last();

        let edge = match waiter.capture(CaptureMode::Block) {
            Ok(Some(edge)) => edge,
            Ok(None) => continue,
            Err(err) => {
                context.hooks.log(LogLevel::Error, &format!("{}: {err}", context.device_name));
                continue;
            }
        };

        let state_raw = waiter.state_last();

        // Interrogation noyau non bloquante juste après le réveil
        // (§4.2 "immediately after a TIOCMIWAIT wakeup, in Poll mode").
        let kernel_edge = kernel
            .as_mut()
            .and_then(|source| match source.capture(CaptureMode::Poll) {
                Ok(captured) => captured,
                Err(err) => {
                    context.hooks.log(LogLevel::Warn, &format!("{}: {err}", context.device_name));
                    None
                }
            });

        let outcome = classifier::classify(&mut state, edge.timestamp, edge.polarity, state_raw, state_last_raw);

        match outcome {
            ClassifyOutcome::SkipUnchanged => continue,
            ClassifyOutcome::EnterCooldown => {
                context.hooks.log(
                    LogLevel::Warn,
                    &format!("{}: line stuck, cooling down for {STUCK_COOLDOWN_SECS}s", context.device_name),
                );
                thread::sleep(Duration::from_secs(STUCK_COOLDOWN_SECS));
            }
            ClassifyOutcome::Reject(reason) => {
                context.hooks.log(LogLevel::Raw, &format!("{}: rejected: {reason}", context.device_name));
            }
            ClassifyOutcome::Accept(accepted) => {
                // Règle de sélection du front final du §4.4 : quand le
                // chemin noyau accepte lui aussi ce front comme un
                // front 1 Hz et qu'une source noyau existe, son
                // horodatage l'emporte sur celui de l'espace
                // utilisateur.
                let ok_kpps = kernel_edge
                    .map(|k| classifier::classify_kpps(&mut state, k.timestamp, k.polarity))
                    .unwrap_or(false);

                let chosen_ts = if ok_kpps {
                    kernel_edge.map(|k| k.timestamp).unwrap_or(edge.timestamp)
                } else {
                    edge.timestamp
                };

                match correlator::correlate(&mut state, &context, accepted, chosen_ts) {
                    Ok(count) => {
                        context.hooks.log(LogLevel::Inf, &format!("{}: published pulse #{count}", context.device_name));
                    }
                    Err(reason) => log_correlator_reject(&context, reason),
                }
            }
        }
    }

    if let Some(source) = kernel.take() {
        drop(source);
    }
    context.hooks.wrap();
}

fn log_correlator_reject(context: &MonitorContext, reason: RejectReason) {
    let level = match reason {
        RejectReason::FiveHzPublicationDisabled | RejectReason::SecondAlreadyHandled => LogLevel::Raw,
        _ => LogLevel::Warn,
    };
    context.hooks.log(level, &format!("{}: not published: {reason}", context.device_name));
}

/// Remonte l'échec de mise en place du PPS noyau comme une ligne de
/// log plutôt que d'abandonner l'activation (§4.2 contract : le PPS
/// noyau est best-effort).
pub fn try_setup_kernel_source(context: &MonitorContext, tty_fd: RawFd) -> Option<KernelPpsSource> {
    match KernelPpsSource::setup(tty_fd, &context.device_name) {
        Ok(source) => Some(source),
        Err(reason) => {
            let err = MonitorError::KernelSetupFailed { device: context.device_name.clone(), reason };
            context.hooks.log(LogLevel::Inf, &format!("{err}, using user-space capture only"));
            None
        }
    }
}
