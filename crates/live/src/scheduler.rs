//! Ordonnancement de la lecture sans trou ni chevauchement
//!
//! Chaque chunk reçu démarre à `max(horloge, fin du chunk précédent)`.
//! Tant que les chunks arrivent plus vite qu'ils ne sont joués, ils
//! s'enchaînent bord à bord ; après un silence, le suivant part tout de
//! suite au lieu de démarrer dans le passé.

use audio::PlaybackId;

/// Buffer programmé et pas encore terminé
#[derive(Clone, Copy, Debug, PartialEq)]
struct ScheduledPlayback {
    id: PlaybackId,
    end_at: f64,
}

/// Planificateur de lecture, en secondes sur l'horloge du contexte de sortie
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start_time: f64,
    active: Vec<ScheduledPlayback>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Premier instant libre après le dernier buffer programmé
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Instant de démarrage du prochain buffer, l'horloge valant `now`
    pub fn slot(&self, now: f64) -> f64 {
        now.max(self.next_start_time)
    }

    /// Enregistre un buffer programmé à `start_at` et avance le curseur
    ///
    /// Retourne l'instant de fin du buffer.
    pub fn commit(&mut self, id: PlaybackId, start_at: f64, duration: f64) -> f64 {
        let end_at = start_at + duration;
        self.next_start_time = end_at;
        self.active.push(ScheduledPlayback { id, end_at });
        end_at
    }

    /// Oublie les buffers terminés naturellement
    ///
    /// Retourne le nombre de buffers retirés.
    pub fn reap(&mut self, now: f64) -> usize {
        let before = self.active.len();
        self.active.retain(|playback| playback.end_at > now);
        before - self.active.len()
    }

    /// Retire tous les buffers encore actifs, pour un arrêt forcé
    pub fn drain(&mut self) -> Vec<PlaybackId> {
        self.active.drain(..).map(|playback| playback.id).collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Programme un chunk comme le ferait la session
    fn schedule(scheduler: &mut PlaybackScheduler, id: u64, now: f64, duration: f64) -> f64 {
        scheduler.reap(now);
        let start = scheduler.slot(now);
        scheduler.commit(PlaybackId(id), start, duration);
        start
    }

    #[test]
    fn test_back_to_back_chunks() {
        let mut scheduler = PlaybackScheduler::new();
        let t0 = 5.0;

        let starts: Vec<f64> = (0..3).map(|i| schedule(&mut scheduler, i, t0, 1.0)).collect();

        assert_eq!(starts, vec![5.0, 6.0, 7.0]);
        assert_eq!(scheduler.next_start_time(), 8.0);
        assert_eq!(scheduler.active_count(), 3);
    }

    #[test]
    fn test_chunk_after_silence_starts_now() {
        let mut scheduler = PlaybackScheduler::new();

        schedule(&mut scheduler, 0, 0.0, 0.5);
        let start = schedule(&mut scheduler, 1, 3.0, 0.5);

        assert_eq!(start, 3.0);
        // Le premier buffer s'est terminé à 0.5
        assert_eq!(scheduler.active_count(), 1);
    }

    #[test]
    fn test_reap_keeps_playing_buffers() {
        let mut scheduler = PlaybackScheduler::new();
        schedule(&mut scheduler, 0, 0.0, 1.0);
        schedule(&mut scheduler, 1, 0.0, 1.0);

        assert_eq!(scheduler.reap(1.5), 1);
        assert_eq!(scheduler.drain(), vec![PlaybackId(1)]);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_gapless_ordering_random_arrivals() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);

        for _ in 0..200 {
            let mut scheduler = PlaybackScheduler::new();
            let mut now = 0.0;
            let mut previous_end: Option<f64> = None;

            for id in 0..rng.usize(1..40) {
                now += rng.f64() * 0.8;
                let duration = 0.01 + rng.f64() * 0.5;

                let start = schedule(&mut scheduler, id as u64, now, duration);

                assert!(start >= now, "démarrage dans le passé: {} < {}", start, now);
                if let Some(end) = previous_end {
                    assert!(start >= end, "chevauchement: {} < {}", start, end);
                }
                previous_end = Some(start + duration);
            }
        }
    }
}
