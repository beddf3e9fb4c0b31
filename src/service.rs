//! Service wiring: store, LLM client, gateway channel, job runner,
//! recovery, and the inbound event loop.

use chrono::Utc;
use promptpipe_core::{
    config::{Config, CoordinatorChoice},
    ids, PromptPipeError,
};
use promptpipe_flow::{
    jobs, recovery, ConversationCoordinator, FlowContext, Prompts, StaticCoordinator,
    TimerService, FLOW_TYPE,
};
use promptpipe_llm::OpenAiClient;
use promptpipe_messaging::{GatewayChannel, InboundMessage};
use promptpipe_store::{JobRunner, Store};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const HANDLER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Either coordinator behind one dispatch point.
enum Dispatcher {
    Llm(ConversationCoordinator),
    Static(StaticCoordinator),
}

impl Dispatcher {
    async fn process(
        &self,
        participant_id: &str,
        phone: &str,
        text: &str,
    ) -> Result<String, PromptPipeError> {
        match self {
            Self::Llm(c) => c.process_response(participant_id, phone, text).await,
            Self::Static(c) => c.process_response(participant_id, phone, text).await,
        }
    }
}

pub async fn run(cfg: Config) -> anyhow::Result<()> {
    let store = Store::new(&cfg.service.db_path).await?;
    let llm = Arc::new(OpenAiClient::from_config(&cfg.llm)?);
    let gateway = Arc::new(GatewayChannel::from_config(&cfg.messaging)?);
    let prompts = Prompts::load(&cfg.service.prompts_dir);

    let ctx = FlowContext::new(
        store.clone(),
        llm,
        gateway.clone(),
        TimerService::new(),
        cfg.flow.clone(),
        cfg.jobs.clone(),
        prompts,
    );

    let mut runner = JobRunner::new(store, &cfg.jobs);
    jobs::register_handlers(&mut runner, ctx.clone());
    tokio::spawn(Arc::new(runner).run());

    recovery::run(&ctx).await?;

    let dispatcher = Arc::new(match cfg.flow.coordinator {
        CoordinatorChoice::Llm => Dispatcher::Llm(ConversationCoordinator::new(ctx.clone())),
        CoordinatorChoice::Static => Dispatcher::Static(StaticCoordinator::new(ctx.clone())),
    });

    let mut inbound = gateway.start();
    info!("promptpipe running");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            msg = inbound.recv() => {
                let Some(msg) = msg else {
                    warn!("gateway channel closed");
                    break;
                };
                let ctx = ctx.clone();
                let dispatcher = dispatcher.clone();
                let auto_enroll = cfg.messaging.auto_enroll;
                tokio::spawn(async move {
                    if let Err(e) = handle_inbound(&ctx, &dispatcher, auto_enroll, msg).await {
                        error!(error = %e, "inbound message failed");
                    }
                });
            }
        }
    }
    Ok(())
}

async fn handle_inbound(
    ctx: &Arc<FlowContext>,
    dispatcher: &Dispatcher,
    auto_enroll: bool,
    msg: InboundMessage,
) -> Result<(), PromptPipeError> {
    let response_id = ids::response_id();
    let phone = ctx
        .messenger
        .validate_and_canonicalize_recipient(&msg.from)?;
    let now = Utc::now();
    debug!(response = %response_id, phone = %phone, "inbound message");

    let participant_id = match ctx.store.lookup_response_handler(&phone, now).await? {
        Some(handler) => handler.participant_id,
        None => match ctx.store.find_participant_by_phone(&phone).await? {
            Some(p) => p.id,
            None if auto_enroll => {
                let p = ctx.store.create_participant(&phone).await?;
                info!(participant = %p.id, "auto-enrolled new participant");
                p.id
            }
            None => {
                warn!(phone = %phone, "message from unknown number dropped");
                return Ok(());
            }
        },
    };

    let Some(participant) = ctx.store.get_participant(&participant_id).await? else {
        warn!(participant = %participant_id, "handler points at missing participant");
        return Ok(());
    };
    if participant.status != "active" {
        debug!(
            participant = %participant_id,
            status = %participant.status,
            "inactive participant, dropping message"
        );
        return Ok(());
    }

    ctx.store
        .register_response_handler(&phone, &participant_id, FLOW_TYPE, HANDLER_TTL, now)
        .await?;

    let reply = dispatcher
        .process(&participant_id, &phone, &msg.text)
        .await?;
    debug!(
        response = %response_id,
        participant = %participant_id,
        reply_len = reply.len(),
        "turn complete"
    );
    Ok(())
}
