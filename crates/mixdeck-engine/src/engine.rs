//! Audio engine: control-side API and the engine thread that mixes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mixdeck_core::{
    convert_frame, AudioInput, AudioOutput, BypassEffect, Effect, Error, FrameFormat, HandleKind,
    ParameterValue, Result, SILENCE,
};
use tracing::{debug, error, info, warn};

use crate::command::{Command, MixerSource, Query, Reply};
use crate::config::EngineConfig;
use crate::effects::{EffectRegistry, EffectSlot};
use crate::handle::{
    EffectHandle, EngineId, Handle, IdAllocator, InputHandle, InputId, MixerHandle, MixerId,
    OutputHandle, OutputId, ResourceKind,
};
use crate::mixer::Mixer;
use crate::queue::{spsc_queue, Consumer, Producer};
use crate::wrappers::{EngineInput, EngineOutput};

/// Flags shared between the control side and the engine thread.
#[derive(Debug)]
struct EngineShared {
    /// Cleared by the control side to stop the engine thread.
    run: AtomicBool,
    /// Cleared by the engine thread when it exits, even by panic.
    alive: AtomicBool,
    /// Sticky aggregate of mixer, output and rejected-command errors.
    error: AtomicBool,
}

/// Real-time mixing engine.
///
/// Creating an engine spawns its thread. Every mutating call queues a
/// command that the engine thread applies before the next mixed frame;
/// queries additionally wait for the engine thread's reply.
///
/// The engine accepts calls from one thread at a time (it is `Send` but not
/// `Sync`). Wrap it in [`SharedEngine`](crate::SharedEngine) to drive it
/// from several threads.
///
/// Dropping the engine stops its thread after the current tick. An output
/// whose `send` blocks forever will block the drop as well.
pub struct AudioEngine {
    id: EngineId,
    ids: IdAllocator,
    config: EngineConfig,
    commands: Producer<Command>,
    replies: Consumer<Reply>,
    shared: Arc<EngineShared>,
    thread: Option<JoinHandle<()>>,
}

impl AudioEngine {
    /// Create an engine at `sample_rate` with default queue sizes.
    pub fn new(sample_rate: u32) -> Result<Self> {
        Self::with_config(EngineConfig::with_sample_rate(sample_rate))
    }

    /// Create an engine from a full configuration.
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let (commands, command_rx) = spsc_queue(config.command_queue_capacity);
        let (reply_tx, replies) = spsc_queue(config.reply_queue_capacity);
        let shared = Arc::new(EngineShared {
            run: AtomicBool::new(true),
            alive: AtomicBool::new(true),
            error: AtomicBool::new(false),
        });

        let worker = EngineWorker::new(
            command_rx,
            reply_tx,
            Arc::clone(&shared),
            config.sample_rate,
        );

        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker.run())
            .map_err(|e| Error::ThreadSpawn(format!("Failed to spawn engine thread: {e}")))?;

        Ok(Self {
            id: EngineId::next(),
            ids: IdAllocator::new(),
            config,
            commands,
            replies,
            shared,
            thread: Some(thread),
        })
    }

    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether the engine thread is still running.
    pub fn is_running(&self) -> bool {
        self.shared.alive.load(Ordering::Acquire)
    }

    /// Sticky flag raised when a mixer or output reported an error, or when
    /// the engine thread rejected a command.
    pub fn error_occurred(&self) -> bool {
        self.shared.error.load(Ordering::Acquire)
    }

    /// Register a source. Its sample rate is set here, before the engine
    /// thread takes ownership.
    pub fn add_input(&self, input: Box<dyn AudioInput>) -> Result<InputHandle> {
        let (handle, command) = self.input_command(input);
        self.send(command)?;
        Ok(handle)
    }

    /// Register a sink. Outputs live as long as the engine.
    pub fn add_output(&self, output: Box<dyn AudioOutput>) -> Result<OutputHandle> {
        let (handle, command) = self.output_command(output);
        self.send(command)?;
        Ok(handle)
    }

    /// Register an effect for use by one track or one mixer at a time.
    pub fn add_effect(&self, effect: Box<dyn Effect>) -> Result<EffectHandle> {
        let (handle, command) = self.effect_command(effect);
        self.send(command)?;
        Ok(handle)
    }

    /// Create a pass-through mixer in `format`.
    pub fn add_mixer(&self, format: FrameFormat) -> Result<MixerHandle> {
        let (handle, command) = self.mixer_command(MixerSource::Format(format));
        self.send(command)?;
        Ok(handle)
    }

    /// Create a mixer driven by `effect`. Tracks are summed in the effect's
    /// input format and the mixer produces the effect's output format.
    pub fn add_mixer_with_effect(&self, effect: &EffectHandle) -> Result<MixerHandle> {
        self.check(effect)?;
        let (handle, command) = self.mixer_command(MixerSource::Effect(effect.clone()));
        self.send(command)?;
        Ok(handle)
    }

    /// Route a mixer into an output. Several mixers may feed one output and
    /// one mixer may feed several outputs.
    pub fn add_mixer_output(&self, mixer: &MixerHandle, output: &OutputHandle) -> Result<()> {
        self.send(self.add_route_command(mixer, output)?)
    }

    pub fn remove_mixer_output(&self, mixer: &MixerHandle, output: &OutputHandle) -> Result<()> {
        self.send(self.remove_route_command(mixer, output)?)
    }

    /// Replace a mixer's effect. The previous effect is released.
    pub fn set_mixer_effect(&self, mixer: &MixerHandle, effect: &EffectHandle) -> Result<()> {
        self.send(self.mixer_effect_command(mixer, effect)?)
    }

    /// Play `input` on `mixer`, converted straight to the mixer's bus format.
    pub fn play(&self, mixer: &MixerHandle, input: &InputHandle) -> Result<()> {
        self.send(self.play_command(mixer, input, None)?)
    }

    /// Play `input` on `mixer` through `effect`.
    pub fn play_with_effect(
        &self,
        mixer: &MixerHandle,
        input: &InputHandle,
        effect: &EffectHandle,
    ) -> Result<()> {
        self.send(self.play_command(mixer, input, Some(effect))?)
    }

    /// Stop every track of `input` on `mixer`. Track effects with a tail keep
    /// sounding until the tail has rung out.
    pub fn stop(&self, mixer: &MixerHandle, input: &InputHandle) -> Result<()> {
        self.send(self.stop_command(mixer, input)?)
    }

    pub fn set_effect_parameter(
        &self,
        effect: &EffectHandle,
        id: usize,
        value: ParameterValue,
    ) -> Result<()> {
        self.send(self.effect_parameter_command(effect, id, value)?)
    }

    /// Set parameter `id` of member `index` inside a composite effect.
    pub fn set_nested_effect_parameter(
        &self,
        effect: &EffectHandle,
        index: usize,
        id: usize,
        value: ParameterValue,
    ) -> Result<()> {
        self.send(self.nested_parameter_command(effect, index, id, value)?)
    }

    pub fn set_input_parameter(
        &self,
        input: &InputHandle,
        id: usize,
        value: ParameterValue,
    ) -> Result<()> {
        self.send(self.input_parameter_command(input, id, value)?)
    }

    pub fn set_output_parameter(
        &self,
        output: &OutputHandle,
        id: usize,
        value: ParameterValue,
    ) -> Result<()> {
        self.send(self.output_parameter_command(output, id, value)?)
    }

    /// Whether `input` is playing on at least one mixer.
    ///
    /// An input that finished and was collected reports `false`.
    pub fn is_playing(&self, input: &InputHandle) -> Result<bool> {
        self.check(input)?;
        Ok(self.query(Query::IsPlaying(input.clone()))?.as_bool())
    }

    pub fn has_ended(&self, output: &OutputHandle) -> Result<bool> {
        self.check(output)?;
        Ok(self.query(Query::HasEnded(output.clone()))?.as_bool())
    }

    pub fn input_value(&self, input: &InputHandle, id: usize) -> Result<ParameterValue> {
        self.check(input)?;
        self.query(Query::InputValue(input.clone(), id))
    }

    pub fn output_value(&self, output: &OutputHandle, id: usize) -> Result<ParameterValue> {
        self.check(output)?;
        self.query(Query::OutputValue(output.clone(), id))
    }

    pub fn effect_value(&self, effect: &EffectHandle, id: usize) -> Result<ParameterValue> {
        self.check(effect)?;
        self.query(Query::EffectValue(effect.clone(), id))
    }

    /// Queue several commands so the engine thread applies them together,
    /// with no frame mixed in between.
    ///
    /// Nothing is queued if `build` fails; handles it created are then
    /// never registered.
    pub fn batch<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce(&mut Batch<'_>) -> Result<()>,
    {
        let mut batch = Batch {
            engine: self,
            commands: Vec::new(),
        };
        build(&mut batch)?;
        if batch.commands.is_empty() {
            return Ok(());
        }
        self.send(Command::Batch(batch.commands))
    }

    fn check<K: ResourceKind>(&self, handle: &Handle<K>) -> Result<()> {
        if handle.engine() == self.id {
            Ok(())
        } else {
            Err(Error::unknown(K::KIND, handle.id().raw()))
        }
    }

    /// Queue a command, spinning while the queue is full.
    fn send(&self, command: Command) -> Result<()> {
        let mut command = command;
        loop {
            if !self.is_running() {
                return Err(Error::EngineStopped);
            }
            match self.commands.try_push(command) {
                Ok(()) => return Ok(()),
                Err(rejected) => {
                    command = rejected;
                    thread::yield_now();
                }
            }
        }
    }

    /// Round trip a query. Replies come back in submission order.
    fn query(&self, query: Query) -> Result<ParameterValue> {
        self.send(Command::Query(query))?;
        loop {
            if let Some(reply) = self.replies.try_pop() {
                return reply;
            }
            if !self.is_running() {
                return self.replies.try_pop().unwrap_or(Err(Error::EngineStopped));
            }
            thread::yield_now();
        }
    }

    fn input_command(&self, mut input: Box<dyn AudioInput>) -> (InputHandle, Command) {
        input.set_sample_rate(self.config.sample_rate);
        let id = self.ids.next();
        let (handle, token) = Handle::new(id, self.id);
        (handle, Command::AddInput { id, input, token })
    }

    fn output_command(&self, mut output: Box<dyn AudioOutput>) -> (OutputHandle, Command) {
        output.set_sample_rate(self.config.sample_rate);
        let id = self.ids.next();
        let (handle, _token) = Handle::new(id, self.id);
        (handle, Command::AddOutput { id, output })
    }

    fn effect_command(&self, mut effect: Box<dyn Effect>) -> (EffectHandle, Command) {
        effect.set_sample_rate(self.config.sample_rate);
        let id = self.ids.next();
        let (handle, token) = Handle::new(id, self.id);
        (handle, Command::AddEffect { id, effect, token })
    }

    fn mixer_command(&self, source: MixerSource) -> (MixerHandle, Command) {
        let id = self.ids.next();
        let (handle, token) = Handle::new(id, self.id);
        (handle, Command::AddMixer { id, source, token })
    }

    fn add_route_command(&self, mixer: &MixerHandle, output: &OutputHandle) -> Result<Command> {
        self.check(mixer)?;
        self.check(output)?;
        Ok(Command::AddMixerOutput {
            mixer: mixer.clone(),
            output: output.clone(),
        })
    }

    fn remove_route_command(&self, mixer: &MixerHandle, output: &OutputHandle) -> Result<Command> {
        self.check(mixer)?;
        self.check(output)?;
        Ok(Command::RemoveMixerOutput {
            mixer: mixer.clone(),
            output: output.clone(),
        })
    }

    fn mixer_effect_command(&self, mixer: &MixerHandle, effect: &EffectHandle) -> Result<Command> {
        self.check(mixer)?;
        self.check(effect)?;
        Ok(Command::SetMixerEffect {
            mixer: mixer.clone(),
            effect: effect.clone(),
        })
    }

    fn play_command(
        &self,
        mixer: &MixerHandle,
        input: &InputHandle,
        effect: Option<&EffectHandle>,
    ) -> Result<Command> {
        self.check(mixer)?;
        self.check(input)?;
        if let Some(effect) = effect {
            self.check(effect)?;
        }
        Ok(Command::Play {
            mixer: mixer.clone(),
            input: input.clone(),
            effect: effect.cloned(),
        })
    }

    fn stop_command(&self, mixer: &MixerHandle, input: &InputHandle) -> Result<Command> {
        self.check(mixer)?;
        self.check(input)?;
        Ok(Command::Stop {
            mixer: mixer.clone(),
            input: input.clone(),
        })
    }

    fn effect_parameter_command(
        &self,
        effect: &EffectHandle,
        id: usize,
        value: ParameterValue,
    ) -> Result<Command> {
        self.check(effect)?;
        Ok(Command::SetEffectParameter {
            effect: effect.clone(),
            id,
            value,
        })
    }

    fn nested_parameter_command(
        &self,
        effect: &EffectHandle,
        index: usize,
        id: usize,
        value: ParameterValue,
    ) -> Result<Command> {
        self.check(effect)?;
        Ok(Command::SetNestedEffectParameter {
            effect: effect.clone(),
            index,
            id,
            value,
        })
    }

    fn input_parameter_command(
        &self,
        input: &InputHandle,
        id: usize,
        value: ParameterValue,
    ) -> Result<Command> {
        self.check(input)?;
        Ok(Command::SetInputParameter {
            input: input.clone(),
            id,
            value,
        })
    }

    fn output_parameter_command(
        &self,
        output: &OutputHandle,
        id: usize,
        value: ParameterValue,
    ) -> Result<Command> {
        self.check(output)?;
        Ok(Command::SetOutputParameter {
            output: output.clone(),
            id,
            value,
        })
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shared.run.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Audio engine thread panicked");
            }
        }
    }
}

/// Commands collected by [`AudioEngine::batch`].
pub struct Batch<'a> {
    engine: &'a AudioEngine,
    commands: Vec<Command>,
}

impl Batch<'_> {
    pub fn add_input(&mut self, input: Box<dyn AudioInput>) -> InputHandle {
        let (handle, command) = self.engine.input_command(input);
        self.commands.push(command);
        handle
    }

    pub fn add_effect(&mut self, effect: Box<dyn Effect>) -> EffectHandle {
        let (handle, command) = self.engine.effect_command(effect);
        self.commands.push(command);
        handle
    }

    pub fn add_mixer_output(&mut self, mixer: &MixerHandle, output: &OutputHandle) -> Result<()> {
        let command = self.engine.add_route_command(mixer, output)?;
        self.commands.push(command);
        Ok(())
    }

    pub fn remove_mixer_output(
        &mut self,
        mixer: &MixerHandle,
        output: &OutputHandle,
    ) -> Result<()> {
        let command = self.engine.remove_route_command(mixer, output)?;
        self.commands.push(command);
        Ok(())
    }

    pub fn set_mixer_effect(&mut self, mixer: &MixerHandle, effect: &EffectHandle) -> Result<()> {
        let command = self.engine.mixer_effect_command(mixer, effect)?;
        self.commands.push(command);
        Ok(())
    }

    pub fn play(&mut self, mixer: &MixerHandle, input: &InputHandle) -> Result<()> {
        let command = self.engine.play_command(mixer, input, None)?;
        self.commands.push(command);
        Ok(())
    }

    pub fn play_with_effect(
        &mut self,
        mixer: &MixerHandle,
        input: &InputHandle,
        effect: &EffectHandle,
    ) -> Result<()> {
        let command = self.engine.play_command(mixer, input, Some(effect))?;
        self.commands.push(command);
        Ok(())
    }

    pub fn stop(&mut self, mixer: &MixerHandle, input: &InputHandle) -> Result<()> {
        let command = self.engine.stop_command(mixer, input)?;
        self.commands.push(command);
        Ok(())
    }

    pub fn set_effect_parameter(
        &mut self,
        effect: &EffectHandle,
        id: usize,
        value: ParameterValue,
    ) -> Result<()> {
        let command = self.engine.effect_parameter_command(effect, id, value)?;
        self.commands.push(command);
        Ok(())
    }

    pub fn set_nested_effect_parameter(
        &mut self,
        effect: &EffectHandle,
        index: usize,
        id: usize,
        value: ParameterValue,
    ) -> Result<()> {
        let command = self
            .engine
            .nested_parameter_command(effect, index, id, value)?;
        self.commands.push(command);
        Ok(())
    }

    pub fn set_input_parameter(
        &mut self,
        input: &InputHandle,
        id: usize,
        value: ParameterValue,
    ) -> Result<()> {
        let command = self.engine.input_parameter_command(input, id, value)?;
        self.commands.push(command);
        Ok(())
    }

    pub fn set_output_parameter(
        &mut self,
        output: &OutputHandle,
        id: usize,
        value: ParameterValue,
    ) -> Result<()> {
        let command = self.engine.output_parameter_command(output, id, value)?;
        self.commands.push(command);
        Ok(())
    }

    /// Number of commands collected so far.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// State owned by the engine thread.
struct EngineWorker {
    commands: Consumer<Command>,
    replies: Producer<Reply>,
    shared: Arc<EngineShared>,
    sample_rate: u32,
    inputs: HashMap<InputId, EngineInput>,
    outputs: HashMap<OutputId, EngineOutput>,
    effects: EffectRegistry,
    mixers: HashMap<MixerId, Mixer>,
    routes: Vec<(MixerId, OutputId)>,
}

impl EngineWorker {
    fn new(
        commands: Consumer<Command>,
        replies: Producer<Reply>,
        shared: Arc<EngineShared>,
        sample_rate: u32,
    ) -> Self {
        Self {
            commands,
            replies,
            shared,
            sample_rate,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            effects: EffectRegistry::default(),
            mixers: HashMap::new(),
            routes: Vec::new(),
        }
    }

    fn run(mut self) {
        info!("Audio engine started at {} Hz", self.sample_rate);

        while self.shared.run.load(Ordering::Acquire) {
            self.tick();
        }

        info!(
            "Audio engine stopped ({} inputs, {} outputs, {} mixers, {} effects)",
            self.inputs.len(),
            self.outputs.len(),
            self.mixers.len(),
            self.effects.len()
        );
    }

    fn tick(&mut self) {
        while let Some(command) = self.commands.try_pop() {
            self.handle_command(command);
        }

        for input in self.inputs.values_mut() {
            input.reset_cached();
        }
        for mixer in self.mixers.values_mut() {
            mixer.reset_cache();
        }

        self.collect_garbage();
        self.mix();

        for output in self.outputs.values_mut() {
            output.finished_frame();
        }

        // Nothing paces the loop without a sink.
        if self.outputs.is_empty() {
            thread::yield_now();
        }
    }

    fn mix(&mut self) {
        let mut frame = SILENCE;
        let mut converted = SILENCE;

        for (mixer_id, output_id) in &self.routes {
            let (Some(mixer), Some(output)) = (
                self.mixers.get_mut(mixer_id),
                self.outputs.get_mut(output_id),
            ) else {
                continue;
            };

            mixer.get(&mut self.inputs, &mut self.effects, &mut frame);
            if mixer.error_occurred() {
                self.shared.error.store(true, Ordering::Release);
            }

            convert_frame(&frame, mixer.format(), &mut converted, output.format());
            output.send(&converted);
            if output.inner().error_occurred() {
                self.shared.error.store(true, Ordering::Release);
            }
        }
    }

    fn collect_garbage(&mut self) {
        self.inputs.retain(|id, input| {
            let dead = input.use_count() == 0 && !input.is_playing();
            if dead {
                debug!("Collected {id}");
            }
            !dead
        });

        let routes = &self.routes;
        let inputs = &mut self.inputs;
        let effects = &mut self.effects;
        self.mixers.retain(|id, mixer| {
            let dead = mixer.is_orphaned()
                && mixer.is_silent()
                && !routes.iter().any(|(routed, _)| routed == id);
            if dead {
                mixer.release(inputs, effects);
                debug!("Collected {id}");
            }
            !dead
        });

        self.effects.collect();
    }

    fn handle_command(&mut self, command: Command) {
        let name = command.name();
        if let Err(e) = self.apply(command) {
            warn!("Rejected {name} command: {e}");
            self.shared.error.store(true, Ordering::Release);
        }
    }

    fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::AddInput { id, input, token } => {
                debug!("Registered {id} ({:?})", input.format());
                self.inputs.insert(id, EngineInput::new(input, token));
            }
            Command::AddOutput { id, output } => {
                debug!("Registered {id} ({:?})", output.format());
                self.outputs.insert(id, EngineOutput::new(output));
            }
            Command::AddEffect { id, effect, token } => {
                debug!(
                    "Registered {id} ({:?} -> {:?}, tail {})",
                    effect.input_format(),
                    effect.output_format(),
                    effect.tail_time()
                );
                self.effects.insert(id, effect, token);
            }
            Command::AddMixer { id, source, token } => {
                let mixer = match source {
                    MixerSource::Format(format) => Mixer::new(format, token),
                    MixerSource::Effect(effect) => {
                        let (bus_format, format) = self.claim_effect(&effect)?;
                        Mixer::with_slot(
                            EffectSlot::Registered(effect.id()),
                            bus_format,
                            format,
                            token,
                        )
                    }
                };
                debug!("Registered {id} ({:?})", mixer.format());
                self.mixers.insert(id, mixer);
            }
            Command::AddMixerOutput { mixer, output } => {
                self.mixer_mut(&mixer)?;
                self.output_mut(&output)?;
                let route = (mixer.id(), output.id());
                if self.routes.contains(&route) {
                    debug!("{} already feeds {}", mixer.id(), output.id());
                } else {
                    self.routes.push(route);
                    let feeds = self.outputs.get_mut(&output.id()).map_or(0, |o| {
                        o.increment_use_count();
                        o.use_count()
                    });
                    debug!("Routed {} to {} ({feeds} mixers)", mixer.id(), output.id());
                }
            }
            Command::RemoveMixerOutput { mixer, output } => {
                let route = (mixer.id(), output.id());
                let position = self
                    .routes
                    .iter()
                    .position(|r| *r == route)
                    .ok_or(Error::NotRouted {
                        mixer: mixer.id().raw(),
                        output: output.id().raw(),
                    })?;
                self.routes.remove(position);
                if let Some(engine_output) = self.outputs.get_mut(&output.id()) {
                    engine_output.decrement_use_count();
                }
                debug!("Unrouted {} from {}", mixer.id(), output.id());
            }
            Command::SetMixerEffect { mixer, effect } => {
                self.mixer_mut(&mixer)?;
                let (bus_format, format) = self.claim_effect(&effect)?;
                let engine_mixer = self.mixer_mut(&mixer)?;
                let slot = EffectSlot::Registered(effect.id());
                let previous = engine_mixer.set_effect(slot, bus_format, format);
                previous.release(&mut self.effects);
                debug!("{} now runs {}", mixer.id(), effect.id());
            }
            Command::Play {
                mixer,
                input,
                effect,
            } => {
                let input_format = self
                    .inputs
                    .get(&input.id())
                    .ok_or_else(|| Error::unknown(HandleKind::Input, input.id().raw()))?
                    .inner()
                    .format();
                let bus_format = self.mixer_mut(&mixer)?.bus_format();
                let slot = match &effect {
                    Some(effect) => {
                        self.claim_effect(effect)?;
                        EffectSlot::Registered(effect.id())
                    }
                    None => EffectSlot::Bypass(BypassEffect::new(input_format, bus_format)),
                };
                let engine_mixer = self
                    .mixers
                    .get_mut(&mixer.id())
                    .ok_or_else(|| Error::unknown(HandleKind::Mixer, mixer.id().raw()))?;
                engine_mixer.add(input.id(), slot, &mut self.inputs);
                debug!(
                    "Playing {} on {} ({} tracks)",
                    input.id(),
                    mixer.id(),
                    engine_mixer.track_count()
                );
            }
            Command::Stop { mixer, input } => {
                let engine_mixer = self
                    .mixers
                    .get_mut(&mixer.id())
                    .ok_or_else(|| Error::unknown(HandleKind::Mixer, mixer.id().raw()))?;
                let stopped = engine_mixer.stop(input.id(), &mut self.inputs, &mut self.effects);
                debug!(
                    "Stopped {stopped} tracks of {} on {} ({} tails)",
                    input.id(),
                    mixer.id(),
                    engine_mixer.tail_count()
                );
                if !engine_mixer.is_playing() {
                    debug!("{} has no active tracks", mixer.id());
                }
            }
            Command::SetEffectParameter { effect, id, value } => {
                self.effect_mut(&effect)?.set_parameter(id, value);
            }
            Command::SetNestedEffectParameter {
                effect,
                index,
                id,
                value,
            } => {
                self.effect_mut(&effect)?
                    .set_nested_parameter(index, id, value);
            }
            Command::SetInputParameter { input, id, value } => {
                self.input_mut(&input)?.inner_mut().set_parameter(id, value);
            }
            Command::SetOutputParameter { output, id, value } => {
                self.output_mut(&output)?
                    .inner_mut()
                    .set_parameter(id, value);
            }
            Command::Query(query) => {
                let reply = self.answer(query);
                if self.replies.try_push(reply).is_err() {
                    warn!("Reply queue full, dropping reply");
                }
            }
            Command::Batch(commands) => {
                for command in commands {
                    self.handle_command(command);
                }
            }
        }
        Ok(())
    }

    fn answer(&mut self, query: Query) -> Reply {
        match query {
            Query::IsPlaying(input) => {
                let playing = self
                    .inputs
                    .get(&input.id())
                    .is_some_and(|i| i.is_playing() && i.use_count() > 0);
                Ok(ParameterValue::boolean(playing))
            }
            Query::HasEnded(output) => {
                let ended = self.output_mut(&output)?.inner().ended();
                Ok(ParameterValue::boolean(ended))
            }
            Query::InputValue(input, id) => Ok(self.input_mut(&input)?.inner().output_value(id)),
            Query::OutputValue(output, id) => {
                Ok(self.output_mut(&output)?.inner().output_value(id))
            }
            Query::EffectValue(effect, id) => Ok(self.effect_mut(&effect)?.output_value(id)),
        }
    }

    /// Claim a registered effect, returning its input and output formats.
    fn claim_effect(&mut self, effect: &EffectHandle) -> Result<(FrameFormat, FrameFormat)> {
        let formats = self
            .effects
            .get(effect.id())
            .map(|e| (e.input_format(), e.output_format()))
            .ok_or_else(|| Error::unknown(HandleKind::Effect, effect.id().raw()))?;
        self.effects.acquire(effect.id())?;
        Ok(formats)
    }

    fn input_mut(&mut self, input: &InputHandle) -> Result<&mut EngineInput> {
        self.inputs
            .get_mut(&input.id())
            .ok_or_else(|| Error::unknown(HandleKind::Input, input.id().raw()))
    }

    fn output_mut(&mut self, output: &OutputHandle) -> Result<&mut EngineOutput> {
        self.outputs
            .get_mut(&output.id())
            .ok_or_else(|| Error::unknown(HandleKind::Output, output.id().raw()))
    }

    fn mixer_mut(&mut self, mixer: &MixerHandle) -> Result<&mut Mixer> {
        self.mixers
            .get_mut(&mixer.id())
            .ok_or_else(|| Error::unknown(HandleKind::Mixer, mixer.id().raw()))
    }

    fn effect_mut(&mut self, effect: &EffectHandle) -> Result<&mut (dyn Effect + 'static)> {
        self.effects
            .get_mut(effect.id())
            .ok_or_else(|| Error::unknown(HandleKind::Effect, effect.id().raw()))
    }
}

impl Drop for EngineWorker {
    fn drop(&mut self) {
        self.shared.alive.store(false, Ordering::Release);
    }
}
