//! Sample-accurate parameter automation
//!
//! An [`AudioParam`] holds a timeline of scheduled value changes on the
//! engine clock of one playback or render pass. Values between events follow
//! the usual audio-graph rules: a `SetValue` event holds until the next
//! event, and a `LinearRamp` event ramps from the value in effect at the
//! previous event to its own value at its own time.

/// Kind of scheduled change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Jump to the value at the event time
    SetValue,
    /// Arrive at the value at the event time, ramping from the previous event
    LinearRamp,
}

/// One scheduled change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamEvent {
    pub kind: EventKind,
    /// Engine time in seconds
    pub time: f64,
    pub value: f32,
}

/// Automatable control value
#[derive(Debug, Clone, PartialEq)]
pub struct AudioParam {
    default: f32,
    events: Vec<ParamEvent>,
}

impl AudioParam {
    pub fn new(default: f32) -> Self {
        Self {
            default,
            events: Vec::new(),
        }
    }

    /// Value used before any event
    pub fn default_value(&self) -> f32 {
        self.default
    }

    /// Scheduled events in time order
    pub fn events(&self) -> &[ParamEvent] {
        &self.events
    }

    /// Schedule an immediate step to `value` at `time`
    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent {
            kind: EventKind::SetValue,
            time,
            value,
        });
    }

    /// Schedule a linear ramp that arrives at `value` at `time`
    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(ParamEvent {
            kind: EventKind::LinearRamp,
            time,
            value,
        });
    }

    /// Drop every event at or after `time`
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|event| event.time < time);
    }

    /// Events at equal times keep their scheduling order
    fn insert(&mut self, event: ParamEvent) {
        let index = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(index, event);
    }

    /// Value of the parameter at engine time `time`
    pub fn value_at(&self, time: f64) -> f32 {
        let next = self.events.partition_point(|e| e.time <= time);
        self.value_between(next, time)
    }

    /// Value at `time` given the index of the first event after it
    #[inline]
    fn value_between(&self, next: usize, time: f64) -> f32 {
        let (start_time, start_value) = match next.checked_sub(1) {
            Some(previous) => (self.events[previous].time, self.events[previous].value),
            None => (0.0, self.default),
        };

        match self.events.get(next) {
            Some(end) if end.kind == EventKind::LinearRamp => {
                let span = end.time - start_time;
                if span <= 0.0 {
                    return end.value;
                }
                let fraction = ((time - start_time) / span).clamp(0.0, 1.0);
                start_value + (end.value - start_value) * fraction as f32
            }
            _ => start_value,
        }
    }

    /// Write per-sample values for a block starting at `start_time`
    ///
    /// Sample `i` is evaluated at `start_time + i / sample_rate`.
    pub fn fill(&self, start_time: f64, sample_rate: u32, out: &mut [f32]) {
        let period = 1.0 / sample_rate as f64;
        let mut next = self.events.partition_point(|e| e.time <= start_time);

        for (i, value) in out.iter_mut().enumerate() {
            let time = start_time + i as f64 * period;
            while next < self.events.len() && self.events[next].time <= time {
                next += 1;
            }
            *value = self.value_between(next, time);
        }
    }

    /// True when the value cannot change at or after `time`
    pub fn is_constant_from(&self, time: f64) -> bool {
        self.events.last().map_or(true, |last| last.time <= time)
    }
}
