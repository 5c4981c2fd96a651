//! Pause gate for mover Jobs

/// Whether the Job may start new pods
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RunGate {
    #[default]
    Running,
    /// No new pods are scheduled. A pod that is already running is left alone.
    Paused,
}

impl RunGate {
    pub fn from_paused(paused: bool) -> Self {
        if paused {
            RunGate::Paused
        } else {
            RunGate::Running
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, RunGate::Paused)
    }

    /// Job parallelism for this gate; never more than one pod
    pub fn parallelism(&self) -> i32 {
        match self {
            RunGate::Running => 1,
            RunGate::Paused => 0,
        }
    }
}
