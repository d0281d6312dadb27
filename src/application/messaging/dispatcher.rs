//! Event dispatcher - fans each event out to every registered descriptor
//!
//! One task is spawned per descriptor. Each task walks its branch on its
//! own: match, ban check, context check, channel group check, permission or
//! admin check, then invoke and deliver. A check that fails ends the branch
//! silently. `dispatch` returns once every branch has settled.

use futures::future::join_all;
use std::sync::Arc;

use crate::application::services::AuthGate;
use crate::domain::entities::{
    BotHandle, ChannelRestriction, ChatEvent, CommandDescriptor, Descriptor, EventKind,
    JoinDescriptor, JoinTrigger, Place, Reply, TransportAction, Trigger,
};
use crate::domain::traits::{HandlerResult, Transport};
use crate::infrastructure::plugins::RegistrySlot;

/// Why a branch ended without invoking its handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoMatch,
    Banned,
    WrongPlace,
    ChannelGroup,
    Unidentified,
    NoPermission,
    NotAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchOutcome {
    Skipped(SkipReason),
    Delivered { lines: usize },
    HandlerFailed { lines: usize },
    TransportFailed { invoked: bool, lines: usize },
}

/// Counts for one dispatched event
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Branches spawned
    pub branches: usize,
    /// Branches whose matcher accepted the event (every join branch)
    pub matched: usize,
    /// Handlers invoked
    pub invoked: usize,
    /// Handler errors, transport failures and panicked branches
    pub failed: usize,
    /// Lines sent to the transport, error lines included
    pub lines: usize,
}

impl DispatchSummary {
    fn record(&mut self, outcome: BranchOutcome) {
        if outcome != BranchOutcome::Skipped(SkipReason::NoMatch) {
            self.matched += 1;
        }
        match outcome {
            BranchOutcome::Skipped(_) => {}
            BranchOutcome::Delivered { lines } => {
                self.invoked += 1;
                self.lines += lines;
            }
            BranchOutcome::HandlerFailed { lines } => {
                self.invoked += 1;
                self.failed += 1;
                self.lines += lines;
            }
            BranchOutcome::TransportFailed { invoked, lines } => {
                if invoked {
                    self.invoked += 1;
                }
                self.failed += 1;
                self.lines += lines;
            }
        }
    }
}

pub struct Dispatcher {
    registry: Arc<RegistrySlot>,
    auth: Arc<AuthGate>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<RegistrySlot>,
        auth: Arc<AuthGate>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            registry,
            auth,
            transport,
        }
    }

    /// Dispatch one event against the registry as it is right now
    pub async fn dispatch(&self, event: ChatEvent) -> DispatchSummary {
        let snapshot = self.registry.snapshot();
        let event = Arc::new(event);

        let descriptors: Vec<Descriptor> = match event.kind {
            EventKind::Join => snapshot.joins.iter().cloned().map(Descriptor::Join).collect(),
            EventKind::Message | EventKind::PrivateMessage => snapshot
                .commands
                .iter()
                .cloned()
                .map(Descriptor::Command)
                .collect(),
        };

        let mut labels = Vec::with_capacity(descriptors.len());
        let mut tasks = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            labels.push((descriptor.plugin().to_string(), descriptor.label().to_string()));
            let branch = Branch {
                event: event.clone(),
                auth: self.auth.clone(),
                transport: self.transport.clone(),
            };
            tasks.push(tokio::spawn(branch.run(descriptor)));
        }

        let mut summary = DispatchSummary {
            branches: tasks.len(),
            ..Default::default()
        };
        for ((plugin, label), result) in labels.into_iter().zip(join_all(tasks).await) {
            match result {
                Ok(outcome) => {
                    if let BranchOutcome::Skipped(reason) = outcome {
                        if reason != SkipReason::NoMatch {
                            tracing::debug!(%plugin, descriptor = %label, ?reason, "Branch skipped");
                        }
                    }
                    summary.record(outcome);
                }
                Err(e) => {
                    tracing::error!(%plugin, descriptor = %label, "Dispatch branch aborted: {}", e);
                    summary.matched += 1;
                    summary.failed += 1;
                }
            }
        }

        tracing::debug!(
            event = %event.id,
            kind = event.kind.as_str(),
            received = %event.received_at,
            branches = summary.branches,
            matched = summary.matched,
            invoked = summary.invoked,
            failed = summary.failed,
            lines = summary.lines,
            "Event dispatched"
        );
        summary
    }
}

/// State shared by one (event, descriptor) branch
struct Branch {
    event: Arc<ChatEvent>,
    auth: Arc<AuthGate>,
    transport: Arc<dyn Transport>,
}

impl Branch {
    async fn run(self, descriptor: Descriptor) -> BranchOutcome {
        match descriptor {
            Descriptor::Command(d) => self.command(d).await,
            Descriptor::Join(d) => self.join(d).await,
        }
    }

    async fn command(self, d: Arc<CommandDescriptor>) -> BranchOutcome {
        let event = &self.event;
        let body = event.body();

        if !d.matcher.test(body) {
            return BranchOutcome::Skipped(SkipReason::NoMatch);
        }
        if self.auth.is_banned(&event.sender) {
            return BranchOutcome::Skipped(SkipReason::Banned);
        }

        let place = match event.place() {
            Some(place) if d.allows(place) => place,
            _ => return BranchOutcome::Skipped(SkipReason::WrongPlace),
        };

        if place == Place::Channel {
            if let ChannelRestriction::Groups(groups) = &d.channels {
                let allowed = groups
                    .iter()
                    .any(|group| self.auth.in_channel_group(group, &event.target));
                if !allowed {
                    return BranchOutcome::Skipped(SkipReason::ChannelGroup);
                }
            }
        }

        if d.needs_identity() {
            let identity = match self.transport.verified_identity(&event.sender).await {
                Ok(Some(identity)) => identity,
                Ok(None) => return BranchOutcome::Skipped(SkipReason::Unidentified),
                Err(e) => {
                    tracing::warn!(plugin = %d.plugin, command = %d.name, "{}", e);
                    return BranchOutcome::TransportFailed {
                        invoked: false,
                        lines: 0,
                    };
                }
            };

            if let Some(group) = &d.permission {
                if !self.auth.has_permission(group, &identity) {
                    return BranchOutcome::Skipped(SkipReason::NoPermission);
                }
            }
            if d.admin_only && !self.auth.is_admin_identity(&identity) {
                return BranchOutcome::Skipped(SkipReason::NotAdmin);
            }
        }

        let trigger = Trigger::new(event, d.matcher.extract(body));
        let reply = Reply::for_trigger(&trigger);
        let bot = BotHandle::new();

        tracing::info!(
            target: "usage",
            plugin = %d.plugin,
            command = %d.name,
            sender = %event.sender,
            to = %event.target,
            "{}",
            body
        );
        let result = d.handler.handle(trigger, reply, bot.clone()).await;
        self.deliver(&d.plugin, &d.name, bot, result).await
    }

    async fn join(self, d: Arc<JoinDescriptor>) -> BranchOutcome {
        let event = &self.event;

        if self.auth.is_banned(&event.sender) {
            return BranchOutcome::Skipped(SkipReason::Banned);
        }

        if d.admin_only {
            match self.auth.is_admin(self.transport.as_ref(), &event.sender).await {
                Ok(true) => {}
                Ok(false) => return BranchOutcome::Skipped(SkipReason::NotAdmin),
                Err(e) => {
                    tracing::warn!(plugin = %d.plugin, "{}", e);
                    return BranchOutcome::TransportFailed {
                        invoked: false,
                        lines: 0,
                    };
                }
            }
        }

        let trigger = JoinTrigger::new(event);
        let bot = BotHandle::new();

        tracing::info!(
            target: "usage",
            plugin = %d.plugin,
            command = "join",
            sender = %event.sender,
            to = %event.target,
            "joined"
        );
        let result = d.handler.handle(trigger, bot.clone()).await;
        self.deliver(&d.plugin, "join", bot, result).await
    }

    /// Perform queued transport actions, then send the handler's lines
    async fn deliver(
        &self,
        plugin: &str,
        label: &str,
        bot: BotHandle,
        result: HandlerResult,
    ) -> BranchOutcome {
        let mut sent = 0;

        for action in bot.take_actions() {
            let outcome = match &action {
                TransportAction::Say { target, line } => self.transport.say(target, line).await,
                TransportAction::Join(channel) => self.transport.join(channel).await,
                TransportAction::Part(channel) => self.transport.part(channel).await,
            };
            if let Err(e) = outcome {
                tracing::warn!(%plugin, descriptor = %label, "{}", e);
                return BranchOutcome::TransportFailed {
                    invoked: true,
                    lines: sent,
                };
            }
            if matches!(action, TransportAction::Say { .. }) {
                sent += 1;
            }
        }

        let target = &self.event.target;
        let (lines, failed) = match result {
            Ok(lines) => (lines, false),
            Err(e) => {
                tracing::error!(%plugin, descriptor = %label, "Handler failed: {}", e);
                (vec![format!("Error: {}", e.message())], true)
            }
        };

        for line in &lines {
            if let Err(e) = self.transport.say(target, line).await {
                tracing::warn!(%plugin, descriptor = %label, "{}", e);
                return BranchOutcome::TransportFailed {
                    invoked: true,
                    lines: sent,
                };
            }
            sent += 1;
        }

        if failed {
            BranchOutcome::HandlerFailed { lines: sent }
        } else {
            BranchOutcome::Delivered { lines: sent }
        }
    }
}
