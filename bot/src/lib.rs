//! Gift-drop minigame engine.
//!
//! Public chat traffic occasionally drops a disguised "secret recipient"
//! label on a participant via DM; retyping the proper label delivers the
//! gift and scores it on a leaderboard. The chat transport and process
//! lifecycle live in the embedding bot; this crate owns the drop trigger,
//! the per-giver assignment state machine, the command surface, and the
//! ledger boundary.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gift_core::{ConfirmReply, NameSource, UserId};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

mod chat;
mod config;
mod ledger;

pub use chat::{ChannelId, ChatClient, ChatError, MessageId, RoleId};
pub use config::{BotConfig, ConfigError, Currency};
pub use ledger::{
    Assignment, DeliveryReceipt, GiftLedger, LedgerError, MemoryLedger, PgLedger, UserRecord,
};

pub const COMMAND_PREFIX: char = '.';

/// Public messages shorter than this never trigger a drop (spam guard).
const MIN_DROP_MESSAGE_LEN: usize = 5;
const LEADERBOARD_LIMIT: i64 = 8;
const LEADERBOARD_LIMIT_LONG: i64 = 25;
const ROSTER_PAGE_LINES: usize = 24;

/// Where an inbound message arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Direct,
    Channel { channel_id: ChannelId },
}

/// The slice of an inbound chat message the minigame consumes.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub author_id: UserId,
    pub author_display_name: String,
    pub source: Source,
    pub message_id: MessageId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join { nickname: Option<String> },
    Check,
    Peek { target: UserId },
    Stats { long: bool },
    List,
    GiveUp,
    Reset,
    ResetUser { target: UserId },
}

fn parse_user_arg(arg: &str) -> Option<UserId> {
    arg.trim()
        .trim_start_matches("<@")
        .trim_start_matches('!')
        .trim_end_matches('>')
        .parse()
        .ok()
}

/// Parse a `.`-prefixed command. Unknown names and malformed arguments are
/// ignored rather than reported.
pub fn parse_command(content: &str) -> Option<Command> {
    let body = content.strip_prefix(COMMAND_PREFIX)?;
    let mut parts = body.trim().splitn(2, char::is_whitespace);
    let name = parts.next()?;
    let rest = parts.next().unwrap_or("").trim();
    match name {
        "join" => Some(Command::Join {
            nickname: (!rest.is_empty()).then(|| rest.to_string()),
        }),
        "check" => Some(Command::Check),
        "peek" => parse_user_arg(rest).map(|target| Command::Peek { target }),
        "stats" => Some(Command::Stats { long: rest == "long" }),
        "list" => Some(Command::List),
        "giveup" => Some(Command::GiveUp),
        "reset" => Some(Command::Reset),
        "reset_user" => parse_user_arg(rest).map(|target| Command::ResetUser { target }),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfirmAction {
    GiveUp,
    ResetUser {
        target: UserId,
        reply_channel: ChannelId,
    },
}

#[derive(Debug, Clone)]
struct PendingConfirm {
    token: String,
    action: ConfirmAction,
}

/// The minigame engine. Construct once, share via [`Arc`], and feed every
/// inbound message to [`GiftBot::handle_message`].
pub struct GiftBot {
    ledger: Arc<dyn GiftLedger>,
    chat: Arc<dyn ChatClient>,
    config: BotConfig,
    /// Cleared by the embedder when the store connection is lost.
    db_available: AtomicBool,
    /// Global single-flight guard: at most one clue compose-and-send cycle
    /// runs at a time, system-wide.
    drop_lock: Mutex<()>,
    /// Givers currently awaiting a guess in DMs. A cache of the ledger's
    /// active-assignment set, rebuilt from the ledger at construction.
    awaiting: RwLock<HashSet<UserId>>,
    /// At most one pending give-up/reset confirmation per user.
    pending_confirms: Mutex<HashMap<UserId, PendingConfirm>>,
    rng: Mutex<ChaCha8Rng>,
}

impl GiftBot {
    pub async fn new(
        ledger: Arc<dyn GiftLedger>,
        chat: Arc<dyn ChatClient>,
        config: BotConfig,
    ) -> Result<Arc<Self>, LedgerError> {
        Self::build(ledger, chat, config, ChaCha8Rng::from_entropy()).await
    }

    /// Deterministic variant for tests and replayable sessions.
    pub async fn seeded(
        ledger: Arc<dyn GiftLedger>,
        chat: Arc<dyn ChatClient>,
        config: BotConfig,
        seed: u64,
    ) -> Result<Arc<Self>, LedgerError> {
        Self::build(ledger, chat, config, ChaCha8Rng::seed_from_u64(seed)).await
    }

    async fn build(
        ledger: Arc<dyn GiftLedger>,
        chat: Arc<dyn ChatClient>,
        config: BotConfig,
        rng: ChaCha8Rng,
    ) -> Result<Arc<Self>, LedgerError> {
        // Reconcile the awaiting cache against the ledger so a restart never
        // strands a giver mid-guess.
        let awaiting: HashSet<UserId> = ledger.awaiting_givers().await?.into_iter().collect();
        Ok(Arc::new(Self {
            ledger,
            chat,
            config,
            db_available: AtomicBool::new(true),
            drop_lock: Mutex::new(()),
            awaiting: RwLock::new(awaiting),
            pending_confirms: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
        }))
    }

    pub fn set_db_available(&self, available: bool) {
        self.db_available.store(available, Ordering::SeqCst);
    }

    fn db_available(&self) -> bool {
        self.db_available.load(Ordering::SeqCst)
    }

    pub async fn is_awaiting(&self, user: UserId) -> bool {
        self.awaiting.read().await.contains(&user)
    }

    /// Single entry point for all inbound traffic, public and direct.
    pub async fn handle_message(self: &Arc<Self>, msg: InboundMessage) {
        if self.try_resolve_confirmation(&msg).await {
            return;
        }

        if msg.content.starts_with(COMMAND_PREFIX) {
            if let Some(command) = parse_command(&msg.content) {
                self.dispatch(command, &msg).await;
            }
            return;
        }

        match msg.source {
            Source::Direct => self.handle_direct_guess(&msg).await,
            Source::Channel { channel_id } => self.maybe_drop(channel_id, &msg).await,
        }
    }

    async fn reply(&self, msg: &InboundMessage, text: &str) {
        let result = match msg.source {
            Source::Direct => self.chat.send_dm(msg.author_id, text).await,
            Source::Channel { channel_id } => self.chat.send_channel(channel_id, text).await,
        };
        if let Err(error) = result {
            debug!(%error, user = msg.author_id, "reply dropped");
        }
    }

    // ---- drop trigger ----

    async fn maybe_drop(self: &Arc<Self>, channel_id: ChannelId, msg: &InboundMessage) {
        if !self.config.drop_channels.contains(&channel_id) {
            return;
        }
        // A drop cycle already in flight wins; this message is not queued.
        if self.drop_lock.try_lock().is_err() {
            return;
        }
        if msg.content.chars().count() < MIN_DROP_MESSAGE_LEN {
            return;
        }

        let roll: f64 = self.rng.lock().await.gen();
        if roll >= self.config.drop_chance {
            return;
        }

        match self.ledger.user(msg.author_id).await {
            Ok(Some(record)) => {
                if msg.sent_at - record.last_gift > self.config.cooldown() {
                    info!(user = msg.author_id, "a natural gift has dropped");
                    self.create_gift(msg).await;
                }
            }
            Ok(None) => {} // not joined, nothing to drop
            Err(error) => error!(%error, user = msg.author_id, "cooldown lookup failed"),
        }
    }

    async fn create_gift(&self, msg: &InboundMessage) {
        let giver = msg.author_id;
        let existing = match self.ledger.active_assignment(giver).await {
            Ok(existing) => existing,
            Err(error) => {
                error!(%error, user = giver, "assignment lookup failed");
                return;
            }
        };

        let first_attempt = existing.is_none();
        let assignment = match existing {
            Some(assignment) => assignment,
            None => {
                let targets = match self.ledger.eligible_targets(giver).await {
                    Ok(targets) => targets,
                    Err(error) => {
                        error!(%error, user = giver, "target lookup failed");
                        return;
                    }
                };
                let picked = {
                    let mut rng = self.rng.lock().await;
                    targets.choose(&mut *rng).cloned()
                };
                let Some((target_user_id, target_nickname)) = picked else {
                    error!("wanted to drop a gift, but found no members to send to");
                    return;
                };
                Assignment {
                    target_user_id,
                    target_nickname,
                }
            }
        };

        if let Err(error) = self
            .ledger
            .record_drop(giver, assignment.target_user_id, msg.sent_at, first_attempt)
            .await
        {
            error!(%error, user = giver, "recording drop failed");
            return;
        }

        self.awaiting.write().await.insert(giver);
        self.deliver_clue(giver, &assignment.target_nickname, first_attempt)
            .await;
    }

    async fn deliver_clue(&self, giver: UserId, target_nickname: &str, first_attempt: bool) {
        let _guard = self.drop_lock.lock().await;

        let (flavor, clue) = {
            let mut rng = self.rng.lock().await;
            let clue = gift_core::obfuscate(target_nickname, &mut *rng);
            let flavor = if first_attempt {
                let ribbon = self
                    .config
                    .gift_colors
                    .choose(&mut *rng)
                    .map(String::as_str)
                    .unwrap_or("plain");
                let wrap = self
                    .config
                    .gift_colors
                    .choose(&mut *rng)
                    .map(String::as_str)
                    .unwrap_or("plain");
                format!("You found a {wrap} present with a {ribbon} ribbon!")
            } else {
                self.config
                    .try_again
                    .choose(&mut *rng)
                    .cloned()
                    .unwrap_or_else(|| "The present came back!".to_string())
            };
            (flavor, clue)
        };

        let text =
            format!("{flavor} {clue} Fix the label and send the gift by typing the proper label.");
        if let Err(error) = self.chat.send_dm(giver, &text).await {
            // Ledger already committed; accepted inconsistency window.
            error!(%error, user = giver, "clue delivery failed");
        }
    }

    // ---- guesses ----

    async fn handle_direct_guess(&self, msg: &InboundMessage) {
        if !self.is_awaiting(msg.author_id).await {
            return;
        }

        let assignment = match self.ledger.active_assignment(msg.author_id).await {
            Ok(Some(assignment)) => assignment,
            Ok(None) => {
                // Cache diverged from the ledger; repair it.
                self.awaiting.write().await.remove(&msg.author_id);
                return;
            }
            Err(error) => {
                error!(%error, user = msg.author_id, "guess lookup failed");
                return;
            }
        };

        if !gift_core::guess_matches(&msg.content, &assignment.target_nickname) {
            return;
        }

        let last_gift = match self.ledger.user(msg.author_id).await {
            Ok(Some(record)) => Some(record.last_gift),
            _ => None,
        };

        self.awaiting.write().await.remove(&msg.author_id);

        let receipt = match self.ledger.complete_delivery(msg.author_id, msg.sent_at).await {
            Ok(receipt) => receipt,
            Err(error) => {
                error!(%error, user = msg.author_id, "completing delivery failed");
                return;
            }
        };

        if let Some(last_gift) = last_gift {
            info!(
                user = msg.author_id,
                nickname = %assignment.target_nickname,
                elapsed_secs = (msg.sent_at - last_gift).num_seconds(),
                "gift delivered"
            );
        }

        if let Err(error) = self
            .chat
            .send_dm(
                msg.author_id,
                &format!(
                    "You successfully sent the gift to {}! (Total gifts sent: {})",
                    receipt.target_nickname, receipt.gifts_sent
                ),
            )
            .await
        {
            error!(%error, user = msg.author_id, "delivery notice failed");
        }

        self.announce_delivery(&receipt).await;
        self.grant_reward_role(msg.author_id, receipt.gifts_sent).await;
    }

    async fn announce_delivery(&self, receipt: &DeliveryReceipt) {
        let template = {
            let mut rng = self.rng.lock().await;
            self.config
                .gift_strings
                .choose(&mut *rng)
                .cloned()
                .unwrap_or_else(|| "{sender} sent a gift to {recipient}!".to_string())
        };
        let text = template
            .replace("{sender}", &format!("**{}**", receipt.giver_nickname))
            .replace("{recipient}", &format!("**{}**", receipt.target_nickname));
        if let Err(error) = self
            .chat
            .send_channel(self.config.announce_channel, &text)
            .await
        {
            error!(%error, "delivery announcement failed");
        }
    }

    async fn grant_reward_role(&self, user: UserId, gifts_sent: i64) {
        let Some(role) = self.config.reward_for(gifts_sent) else {
            return;
        };
        let reason = format!("Reached {gifts_sent} gifts sent reward.");
        if let Err(error) = self.chat.add_role(user, role, &reason).await {
            warn!(%error, user, role, "failed to grant reward role");
        }
    }

    // ---- confirmation flows ----

    async fn begin_confirmation(self: &Arc<Self>, user: UserId, action: ConfirmAction) -> String {
        let token = {
            let mut rng = self.rng.lock().await;
            gift_core::confirmation_token(&mut *rng)
        };
        self.pending_confirms.lock().await.insert(
            user,
            PendingConfirm {
                token: token.clone(),
                action,
            },
        );

        let bot = Arc::clone(self);
        let timer_token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(bot.config.confirm_window()).await;
            bot.expire_confirmation(user, &timer_token).await;
        });

        token
    }

    async fn expire_confirmation(&self, user: UserId, token: &str) {
        let expired = {
            let mut pending = self.pending_confirms.lock().await;
            // A newer confirmation may have replaced this one; only reap our
            // own token.
            match pending.get(&user) {
                Some(entry) if entry.token == token => pending.remove(&user),
                _ => None,
            }
        };
        let Some(entry) = expired else { return };
        match entry.action {
            ConfirmAction::GiveUp => {
                if let Err(error) = self
                    .chat
                    .send_dm(user, &format!("Timed out request to reset {user}."))
                    .await
                {
                    debug!(%error, user, "timeout notice dropped");
                }
            }
            ConfirmAction::ResetUser {
                target,
                reply_channel,
            } => {
                if let Err(error) = self
                    .chat
                    .send_channel(reply_channel, &format!("Timed out request to reset {target}."))
                    .await
                {
                    debug!(%error, "timeout notice dropped");
                }
            }
        }
    }

    /// Returns true when the message resolved a pending confirmation and
    /// must not be processed further.
    async fn try_resolve_confirmation(&self, msg: &InboundMessage) -> bool {
        let resolved = {
            let mut pending = self.pending_confirms.lock().await;
            let Some(entry) = pending.get(&msg.author_id) else {
                return false;
            };
            match gift_core::classify_confirm_reply(&msg.content, &entry.token) {
                ConfirmReply::Ignored => return false,
                verdict => pending
                    .remove(&msg.author_id)
                    .map(|entry| (verdict, entry.action)),
            }
        };
        let Some((verdict, action)) = resolved else {
            return false;
        };

        if verdict == ConfirmReply::Cancelled {
            self.reply(msg, "Cancelled.").await;
        } else {
            match action {
                ConfirmAction::GiveUp => self.finish_give_up(msg).await,
                ConfirmAction::ResetUser {
                    target,
                    reply_channel,
                } => self.finish_reset_user(target, reply_channel).await,
            }
        }
        true
    }

    async fn finish_give_up(&self, msg: &InboundMessage) {
        match self.ledger.abandon_assignment(msg.author_id).await {
            Ok(answer) => {
                self.awaiting.write().await.remove(&msg.author_id);
                self.reply(
                    msg,
                    &format!("Deleted, the answer was **{}**", answer.to_lowercase()),
                )
                .await;
            }
            Err(LedgerError::NoActiveAssignment(_)) => {
                self.reply(msg, "You don't have anything to give up on").await;
            }
            Err(error) => error!(%error, user = msg.author_id, "give-up failed"),
        }
    }

    async fn finish_reset_user(&self, target: UserId, reply_channel: ChannelId) {
        match self.ledger.delete_user(target).await {
            Ok(_) => {
                self.awaiting.write().await.remove(&target);
                if let Err(error) = self
                    .chat
                    .send_channel(reply_channel, &format!("Cleared entry for {target}"))
                    .await
                {
                    debug!(%error, "reset notice dropped");
                }
            }
            Err(error) => error!(%error, target, "reset failed"),
        }
    }

    // ---- commands ----

    async fn dispatch(self: &Arc<Self>, command: Command, msg: &InboundMessage) {
        match command {
            Command::Join { nickname } => self.cmd_join(nickname, msg).await,
            Command::Check => self.cmd_check(msg).await,
            Command::Peek { target } => self.cmd_peek(target, msg).await,
            Command::Stats { long } => self.cmd_stats(long, msg).await,
            Command::List => self.cmd_list(msg).await,
            Command::GiveUp => self.cmd_give_up(msg).await,
            Command::Reset => self.cmd_reset(msg).await,
            Command::ResetUser { target } => self.cmd_reset_user(target, msg).await,
        }
    }

    async fn is_staff(&self, user: UserId) -> bool {
        match self.chat.member_is_staff(user).await {
            Ok(is_staff) => is_staff,
            Err(error) => {
                debug!(%error, user, "staff check failed");
                false
            }
        }
    }

    async fn cmd_join(self: &Arc<Self>, nickname: Option<String>, msg: &InboundMessage) {
        let Source::Channel { .. } = msg.source else {
            return;
        };
        if !self.db_available() {
            return;
        }

        let (candidate, source) = match &nickname {
            Some(custom) => (custom.as_str(), NameSource::Custom),
            None => (msg.author_display_name.as_str(), NameSource::DisplayName),
        };
        let errors = gift_core::validate_nickname(candidate, source);
        if !errors.is_empty() {
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(",\n");
            self.reply(msg, &format!("<@{}>, {joined}", msg.author_id)).await;
            return;
        }

        match self.ledger.user(msg.author_id).await {
            Ok(Some(_)) => {
                self.reply(
                    msg,
                    &format!(
                        "<@{}> You have already joined the event. \
                         You can ask a staff member to change your nickname.",
                        msg.author_id
                    ),
                )
                .await;
            }
            Ok(None) => match self
                .ledger
                .join_user(msg.author_id, candidate, msg.sent_at)
                .await
            {
                Ok(record) => {
                    self.reply(
                        msg,
                        &format!(
                            "<@{}> has joined the gift exchange as **{}**!",
                            msg.author_id, record.nickname
                        ),
                    )
                    .await;
                }
                Err(error) => error!(%error, user = msg.author_id, "join failed"),
            },
            Err(error) => error!(%error, user = msg.author_id, "join lookup failed"),
        }
    }

    async fn cmd_check(&self, msg: &InboundMessage) {
        if !self.db_available() {
            return;
        }

        let text = match self.ledger.user(msg.author_id).await {
            Ok(Some(record)) => format!(
                "You ({}) have sent {} and received {} \u{1F381} **Gifts**.",
                record.nickname, record.gifts_sent, record.gifts_received
            ),
            Ok(None) => {
                "You haven't sent any gifts yet! Use `.join` in a channel to join the fun!"
                    .to_string()
            }
            Err(error) => {
                error!(%error, user = msg.author_id, "check lookup failed");
                return;
            }
        };

        if let Err(error) = self.chat.send_dm(msg.author_id, &text).await {
            debug!(%error, user = msg.author_id, "check notice dropped");
            return;
        }
        if let Source::Channel { channel_id } = msg.source {
            if let Err(error) = self.chat.delete_message(channel_id, msg.message_id).await {
                debug!(%error, "check cleanup dropped");
            }
        }
    }

    async fn cmd_peek(&self, target: UserId, msg: &InboundMessage) {
        if !self.is_staff(msg.author_id).await {
            return;
        }
        if !self.db_available() {
            return;
        }

        let plural = &self.config.currency.plural;
        match self.ledger.user(target).await {
            Ok(Some(record)) => {
                self.reply(
                    msg,
                    &format!(
                        "<@{target}> {} has sent {} and received {} {plural}.",
                        record.nickname, record.gifts_sent, record.gifts_received
                    ),
                )
                .await;
            }
            Ok(None) => {
                self.reply(msg, &format!("<@{target}> hasn't gotten any {plural} yet!"))
                    .await;
            }
            Err(error) => error!(%error, target, "peek lookup failed"),
        }
    }

    async fn cmd_stats(&self, long: bool, msg: &InboundMessage) {
        if !self.db_available() {
            return;
        }

        let long_allowed = match msg.source {
            Source::Direct => true,
            Source::Channel { .. } => self.is_staff(msg.author_id).await,
        };
        let limit = if long && long_allowed {
            LEADERBOARD_LIMIT_LONG
        } else {
            LEADERBOARD_LIMIT
        };

        let rows = match self.ledger.leaderboard(limit).await {
            Ok(rows) => rows,
            Err(error) => {
                error!(%error, "leaderboard query failed");
                return;
            }
        };

        let currency = &self.config.currency;
        let listing: Vec<String> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let label = if row.gifts_sent == 1 {
                    &currency.singular
                } else {
                    &currency.plural
                };
                format!(
                    "{}: <@{}> with {} {label} sent as {}",
                    index + 1,
                    row.user_id,
                    row.gifts_sent,
                    row.nickname
                )
            })
            .collect();
        self.reply(msg, &listing.join("\n")).await;
    }

    async fn cmd_list(&self, msg: &InboundMessage) {
        if !self.db_available() {
            return;
        }

        let rows = match self.ledger.roster().await {
            Ok(rows) => rows,
            Err(error) => {
                error!(%error, "roster query failed");
                return;
            }
        };

        let lines: Vec<String> = rows
            .iter()
            .map(|row| format!("{} ({}:{})", row.nickname, row.gifts_sent, row.gifts_received))
            .collect();

        if lines.is_empty() {
            if let Err(error) = self
                .chat
                .send_dm(msg.author_id, "Nobody has joined the event yet.")
                .await
            {
                debug!(%error, "roster notice dropped");
            }
            return;
        }

        for (index, page) in gift_core::paginate(&lines, ROSTER_PAGE_LINES).iter().enumerate() {
            let mut text = page.join("\n");
            if index == 0 {
                text = format!(
                    "A list of all the people participating in gift-giving.\n{text}"
                );
            }
            if let Err(error) = self.chat.send_dm(msg.author_id, &text).await {
                debug!(%error, "roster page dropped");
                return;
            }
        }
        if let Source::Channel { channel_id } = msg.source {
            if let Err(error) = self.chat.delete_message(channel_id, msg.message_id).await {
                debug!(%error, "roster cleanup dropped");
            }
        }
    }

    async fn cmd_give_up(self: &Arc<Self>, msg: &InboundMessage) {
        if !self.db_available() {
            return;
        }

        let has_active = match self.ledger.has_active(msg.author_id).await {
            Ok(has_active) => has_active,
            Err(error) => {
                error!(%error, user = msg.author_id, "give-up lookup failed");
                return;
            }
        };

        match msg.source {
            Source::Direct => {
                if !has_active {
                    self.reply(msg, "You don't have anything to give up on").await;
                    return;
                }
                let token = self
                    .begin_confirmation(msg.author_id, ConfirmAction::GiveUp)
                    .await;
                self.reply(
                    msg,
                    &format!("Are you sure you want to give up? Type '{token}' or 'cancel'"),
                )
                .await;
            }
            Source::Channel { .. } => {
                if has_active {
                    self.reply(msg, "You can only give up on gifts in DMs").await;
                } else {
                    self.reply(msg, "You don't have anything to give up on").await;
                }
            }
        }
    }

    async fn cmd_reset(&self, msg: &InboundMessage) {
        let Source::Channel { .. } = msg.source else {
            return;
        };
        if !self.db_available() {
            self.reply(msg, "No connection to database.").await;
            return;
        }

        match self.ledger.user(msg.author_id).await {
            Ok(None) => {
                self.reply(msg, "This user doesn't have a database entry.").await;
            }
            Ok(Some(_)) => match self.ledger.delete_user(msg.author_id).await {
                Ok(_) => {
                    self.awaiting.write().await.remove(&msg.author_id);
                    self.reply(msg, &format!("Cleared entry for {}", msg.author_id))
                        .await;
                }
                Err(error) => error!(%error, user = msg.author_id, "reset failed"),
            },
            Err(error) => error!(%error, user = msg.author_id, "reset lookup failed"),
        }
    }

    async fn cmd_reset_user(self: &Arc<Self>, target: UserId, msg: &InboundMessage) {
        let Source::Channel { channel_id } = msg.source else {
            return;
        };
        if !self.is_staff(msg.author_id).await {
            return;
        }
        if !self.db_available() {
            self.reply(msg, "No connection to database.").await;
            return;
        }

        let record = match self.ledger.user(target).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.reply(msg, "This user doesn't have a database entry.").await;
                return;
            }
            Err(error) => {
                error!(%error, target, "reset_user lookup failed");
                return;
            }
        };

        let token = self
            .begin_confirmation(
                msg.author_id,
                ConfirmAction::ResetUser {
                    target,
                    reply_channel: channel_id,
                },
            )
            .await;
        self.reply(
            msg,
            &format!(
                "Are you sure? This user has {} {} sent, last picking one up at {} UTC. \
                 (type '{token}' or 'cancel')",
                record.gifts_sent,
                self.config.currency.plural,
                record.last_gift.format("%Y-%m-%d %H:%M:%S")
            ),
        )
        .await;
    }
}
