//! Polyphonic voice management.
//!
//! A [`PolyphonicObjectInstance`] owns a fixed pool of voices. Each voice is a
//! subgraph built once by a [`VoiceFactory`] around an envelope generator the
//! pool creates for it. Triggers pick an idle voice or steal one; releases
//! move a voice into its release segment; the envelope reports the end of the
//! release through a bounded queue and the pool returns the voice to idle.
//! Voices triggered with a held shape release themselves, and the envelope
//! reports that moment through the same queue.
//!
//! # Voice lifecycle
//!
//! ```text
//!            play           release / hold end        envelope done        reclaim
//!   Idle ──────────▶ Active ──────────▶ Releasing ──────────────▶ Finished ───────▶ Idle
//!                      ▲  │ steal (retrigger)                          │
//!                      └──┴────────────────────────────────────────────┘
//! ```
//!
//! All bookkeeping happens on the control thread. The audio thread only
//! renders the envelopes and pushes completion records.
//!
//! # Stealing
//!
//! With no idle voice, the oldest-activated `Active` voice is retriggered. If
//! every voice is already releasing, the oldest-activated voice overall is
//! taken. A trigger is never dropped.

use crossbeam_channel::Receiver;

use crate::envelope::{
    CompletionNotifier, EnvelopeCompletion, EnvelopeControl, EnvelopeNode, EnvelopeShape,
    EnvelopeStage,
};
use crate::error::{GraphError, ObjectError};
use crate::manager::NodeManager;
use crate::mix::MixNode;
use crate::multichannel::MAX_CHANNELS;
use crate::object::AudioObjectInstance;
use crate::safe::{OutputRef, SafeOwner};

/// Pool dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolyphonicObject {
    /// Number of voices; must be at least one.
    pub voice_count: usize,
    /// Output channels of every voice and of the object.
    pub channel_count: usize,
}

impl PolyphonicObject {
    /// Pool of `voice_count` voices with `channel_count` channels each.
    pub fn new(voice_count: usize, channel_count: usize) -> Self {
        Self {
            voice_count,
            channel_count,
        }
    }
}

/// Lifecycle state of a voice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VoiceState {
    /// Unused and disconnected.
    #[default]
    Idle,
    /// Triggered and sounding.
    Active,
    /// Released; envelope in its release segment.
    Releasing,
    /// Envelope reached zero; waiting to be reclaimed.
    Finished,
}

/// Identifies one activation of one voice. Stale ids are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId {
    /// Voice index in the pool.
    pub index: usize,
    /// Activation stamp.
    pub activation: u64,
}

/// What a [`VoiceFactory`] receives when building voice `index`.
#[derive(Debug)]
pub struct VoiceContext<'a> {
    /// Voice index in the pool.
    pub index: usize,
    /// Manager to register the voice's nodes with.
    pub manager: &'a NodeManager,
    /// Output of the voice's envelope generator.
    pub envelope: OutputRef,
}

/// A built voice: one output per channel plus the nodes that produce them.
pub struct VoiceGraph<V> {
    /// One mono output per object channel.
    pub outputs: Vec<OutputRef>,
    /// Caller data, typically the `SafeOwner`s of the voice's nodes.
    pub payload: V,
}

/// Builds one voice subgraph. Closures of the matching shape implement it.
pub trait VoiceFactory<V> {
    /// Build voice `ctx.index`.
    fn build(&self, ctx: &VoiceContext<'_>) -> Result<VoiceGraph<V>, ObjectError>;
}

impl<V, F> VoiceFactory<V> for F
where
    F: Fn(&VoiceContext<'_>) -> Result<VoiceGraph<V>, ObjectError>,
{
    fn build(&self, ctx: &VoiceContext<'_>) -> Result<VoiceGraph<V>, ObjectError> {
        self(ctx)
    }
}

/// One pooled voice.
pub struct Voice<V> {
    envelope: SafeOwner<EnvelopeControl>,
    outputs: Vec<OutputRef>,
    payload: V,
    state: VoiceState,
    activation: u64,
    connected: bool,
}

impl<V> Voice<V> {
    /// Lifecycle state.
    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// Whether the voice outputs currently feed the object's mixers.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Envelope control of the voice.
    pub fn envelope(&self) -> &EnvelopeControl {
        &self.envelope
    }

    /// Caller data.
    pub fn payload(&self) -> &V {
        &self.payload
    }
}

/// Live polyphonic object.
pub struct PolyphonicObjectInstance<V> {
    name: String,
    manager: NodeManager,
    voices: Vec<Voice<V>>,
    mixers: Vec<SafeOwner>,
    events: Receiver<EnvelopeCompletion>,
    next_activation: u64,
    listeners: Vec<Box<dyn FnMut(VoiceId) + Send>>,
    release_listeners: Vec<Box<dyn FnMut(VoiceId) + Send>>,
}

impl<V> PolyphonicObjectInstance<V> {
    /// Build the mixers and every voice.
    pub fn init(
        settings: PolyphonicObject,
        name: impl Into<String>,
        manager: &NodeManager,
        factory: &impl VoiceFactory<V>,
    ) -> Result<Self, ObjectError> {
        let name = name.into();
        if settings.voice_count == 0 {
            return Err(ObjectError::InvalidVoiceCount(name));
        }
        if !(1..=MAX_CHANNELS).contains(&settings.channel_count) {
            return Err(ObjectError::InvalidChannelCount {
                object: name,
                count: settings.channel_count,
                limit: MAX_CHANNELS,
            });
        }

        // Every voice ends its hold and its release at most once per
        // activation, and activations are reclaimed before new ones start.
        let (events_tx, events) = crossbeam_channel::bounded(settings.voice_count * 4);

        let mixers = (0..settings.channel_count)
            .map(|_| manager.register(MixNode::new(settings.voice_count)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut voices = Vec::with_capacity(settings.voice_count);
        for index in 0..settings.voice_count {
            let notifier = CompletionNotifier::new(events_tx.clone(), index);
            let (node, control) = EnvelopeNode::with_notifier(notifier);
            let envelope = manager.register_with(node, control)?;
            manager.add_root(&envelope.ptr())?;

            let graph = factory.build(&VoiceContext {
                index,
                manager,
                envelope: envelope.output(0),
            })?;
            if graph.outputs.len() != settings.channel_count {
                return Err(ObjectError::ChannelMismatch {
                    object: name,
                    voice: index,
                    expected: settings.channel_count,
                    found: graph.outputs.len(),
                });
            }
            voices.push(Voice {
                envelope,
                outputs: graph.outputs,
                payload: graph.payload,
                state: VoiceState::Idle,
                activation: 0,
                connected: false,
            });
        }

        tracing::debug!(
            "polyphonic_init: '{name}' with {} voices × {} channels",
            settings.voice_count,
            settings.channel_count
        );
        Ok(Self {
            name,
            manager: manager.clone(),
            voices,
            mixers,
            events,
            next_activation: 0,
            listeners: Vec::new(),
            release_listeners: Vec::new(),
        })
    }

    /// Start a voice.
    ///
    /// Finished voices are reclaimed first. An idle voice is used if one
    /// exists; otherwise one is stolen and retriggered. `configure` runs on the
    /// chosen voice's payload before its envelope is triggered.
    pub fn play(
        &mut self,
        shape: EnvelopeShape,
        configure: impl FnOnce(&mut V),
    ) -> Result<VoiceId, GraphError> {
        self.reclaim();

        let index = match self.voices.iter().position(|v| v.state == VoiceState::Idle) {
            Some(index) => index,
            None => {
                let index = self.steal_candidate();
                tracing::debug!("voice_steal: '{}' voice {index}", self.name);
                index
            }
        };

        let voice = &mut self.voices[index];
        if !voice.connected {
            for (output, mixer) in voice.outputs.iter().zip(&self.mixers) {
                self.manager.connect(*output, mixer.input(index))?;
            }
            voice.connected = true;
        }

        self.next_activation += 1;
        let activation = self.next_activation;
        voice.state = VoiceState::Active;
        voice.activation = activation;
        configure(&mut voice.payload);
        voice.envelope.trigger_with(shape, activation);

        Ok(VoiceId { index, activation })
    }

    /// Oldest-activated active voice, else oldest-activated voice.
    fn steal_candidate(&self) -> usize {
        let oldest = |active_only: bool| {
            self.voices
                .iter()
                .enumerate()
                .filter(|(_, v)| !active_only || v.state == VoiceState::Active)
                .min_by_key(|(_, v)| v.activation)
                .map(|(index, _)| index)
        };
        oldest(true).or_else(|| oldest(false)).unwrap_or(0)
    }

    /// Move an active voice into its release segment. Returns `false` for
    /// stale ids and voices not currently active.
    pub fn release(&mut self, id: VoiceId) -> bool {
        let Some(voice) = self.voices.get_mut(id.index) else {
            return false;
        };
        if voice.activation != id.activation || voice.state != VoiceState::Active {
            return false;
        }
        voice.state = VoiceState::Releasing;
        voice.envelope.release();
        true
    }

    /// Silence a voice immediately and return it to idle. No completion is
    /// reported to listeners.
    pub fn stop(&mut self, id: VoiceId) -> bool {
        let busy = self.voices.get(id.index).is_some_and(|voice| {
            voice.activation == id.activation && voice.state != VoiceState::Idle
        });
        if !busy {
            return false;
        }
        self.voices[id.index].envelope.stop();
        self.idle(id.index);
        true
    }

    /// Drain completion records and mark matching voices `Finished`.
    /// Returns the number of voices that finished.
    ///
    /// Voices whose held sustain ran out move to `Releasing` and the
    /// [`on_voice_released`](Self::on_voice_released) listeners are called.
    pub fn poll_events(&mut self) -> usize {
        let mut finished = 0;
        while let Ok(completion) = self.events.try_recv() {
            let Some(voice) = self.voices.get_mut(completion.id) else {
                continue;
            };
            if voice.activation != completion.activation {
                continue;
            }
            match (completion.segment, voice.state) {
                (EnvelopeStage::Sustain, VoiceState::Active) => {
                    voice.state = VoiceState::Releasing;
                    let id = VoiceId {
                        index: completion.id,
                        activation: completion.activation,
                    };
                    for listener in &mut self.release_listeners {
                        listener(id);
                    }
                }
                (EnvelopeStage::Release, VoiceState::Active | VoiceState::Releasing) => {
                    voice.state = VoiceState::Finished;
                    finished += 1;
                }
                _ => {}
            }
        }
        finished
    }

    /// Return finished voices to idle and notify listeners. Returns the number
    /// of voices reclaimed.
    pub fn reclaim(&mut self) -> usize {
        self.poll_events();
        let mut reclaimed = 0;
        for index in 0..self.voices.len() {
            if self.voices[index].state != VoiceState::Finished {
                continue;
            }
            let id = VoiceId {
                index,
                activation: self.voices[index].activation,
            };
            self.idle(index);
            for listener in &mut self.listeners {
                listener(id);
            }
            reclaimed += 1;
        }
        reclaimed
    }

    fn idle(&mut self, index: usize) {
        let voice = &mut self.voices[index];
        voice.state = VoiceState::Idle;
        if voice.connected {
            for mixer in &self.mixers {
                if let Err(err) = self.manager.disconnect(mixer.input(index)) {
                    tracing::warn!("failed to disconnect voice {index} of '{}': {err}", self.name);
                }
            }
            voice.connected = false;
        }
    }

    /// Call `listener` on the control thread whenever a voice is reclaimed
    /// after its envelope finished.
    pub fn on_voice_finished(&mut self, listener: impl FnMut(VoiceId) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Call `listener` on the control thread whenever a voice started with a
    /// held shape begins its release by itself. Runs from
    /// [`poll_events`](Self::poll_events).
    pub fn on_voice_released(&mut self, listener: impl FnMut(VoiceId) + Send + 'static) {
        self.release_listeners.push(Box::new(listener));
    }

    /// Pool size.
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Voice `index`, or `None` when out of range.
    pub fn voice(&self, index: usize) -> Option<&Voice<V>> {
        self.voices.get(index)
    }

    /// State of voice `index`.
    pub fn voice_state(&self, index: usize) -> Option<VoiceState> {
        self.voices.get(index).map(Voice::state)
    }

    /// Voices that are not idle.
    pub fn busy_voice_count(&self) -> usize {
        self.voices
            .iter()
            .filter(|v| v.state != VoiceState::Idle)
            .count()
    }

    /// Payload of a voice while `id` is its current activation.
    pub fn payload_mut(&mut self, id: VoiceId) -> Option<&mut V> {
        self.voices
            .get_mut(id.index)
            .filter(|voice| voice.activation == id.activation && voice.state != VoiceState::Idle)
            .map(|voice| &mut voice.payload)
    }
}

impl<V: Send> AudioObjectInstance for PolyphonicObjectInstance<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_count(&self) -> usize {
        self.mixers.len()
    }

    fn output_for_channel(&self, channel: usize) -> Option<OutputRef> {
        self.mixers.get(channel).map(|mixer| mixer.output(0))
    }
}
