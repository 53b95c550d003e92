//! Supervisor：驱动阶段状态机
//!
//! 从 Researcher 开始，依次运行阶段并按路由信号前进：
//! - CONTINUE(next)：记录并切到 next
//! - RETRY(stage)：该阶段重试计数 +1，超出预算即转为 ABORT("retry budget exhausted")
//! - ABORT(reason)：状态置 FAILED，原因写入 stage_history
//! - DONE：进入 RECONCILING，对账恰好一次后 COMPLETED
//!
//! 每次调用阶段前检查取消信号、运行截止时间与全局步数上限，保证一定终止。
//! 阶段运行中不会被打断，取消只在阶段边界生效。

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::events::send_event;
use crate::core::{
    ComplianceFlag, PlanningState, RoutingSignal, RunEvent, RunFailure, RunStatus, StageName, StageOutcome,
    StageRecord,
};
use crate::output::{reconcile, ItineraryResponse};
use crate::stages::{StageContext, StageSet};

/// 单次运行的外部控制：取消、截止时间、状态与事件推送
#[derive(Default)]
pub struct RunControl {
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
    pub status_tx: Option<watch::Sender<RunStatus>>,
    pub events: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl RunControl {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Default::default()
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_status(mut self, tx: watch::Sender<RunStatus>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    pub fn with_events(mut self, tx: Option<mpsc::UnboundedSender<RunEvent>>) -> Self {
        self.events = tx;
        self
    }
}

/// 状态机驱动器；跨运行共享，自身不持有任何运行级状态
#[derive(Clone)]
pub struct Supervisor {
    stages: StageSet,
    ctx: StageContext,
}

fn record(stage: &str, outcome: StageOutcome, retry_count: u32, flags: Vec<ComplianceFlag>) -> StageRecord {
    StageRecord {
        stage: stage.to_string(),
        outcome,
        at: chrono::Utc::now(),
        retry_count,
        flags,
        detail: None,
    }
}

/// 再次触发的已有标记写进历史条目的 detail，新增标记只记在 flags 里
fn repeated_detail(repeated: &[ComplianceFlag]) -> Option<String> {
    if repeated.is_empty() {
        return None;
    }
    let messages: Vec<String> = repeated
        .iter()
        .map(|f| format!("{}: {}", format!("{:?}", f.severity).to_uppercase(), f.message))
        .collect();
    Some(format!("raised again: {}", messages.join("; ")))
}

fn with_detail(mut entry: StageRecord, detail: Option<String>) -> StageRecord {
    entry.detail = detail;
    entry
}

impl Supervisor {
    pub fn new(stages: StageSet, ctx: StageContext) -> Self {
        Self { stages, ctx }
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    fn transition(&self, state: &mut PlanningState, control: &RunControl, status: RunStatus) {
        if state.status() == status {
            return;
        }
        state.set_status(status);
        if let Some(tx) = &control.status_tx {
            tx.send_replace(status);
        }
        send_event(
            control.events.as_ref(),
            RunEvent::StatusChanged {
                run_id: state.run_id().to_string(),
                status,
            },
        );
    }

    /// 终止运行：状态置 FAILED；supervisor 层面的原因额外写一条历史
    fn fail(
        &self,
        state: &mut PlanningState,
        control: &RunControl,
        reason: &str,
        detail: Option<String>,
        from_supervisor: bool,
    ) -> RunFailure {
        if from_supervisor {
            let mut entry = record(
                "supervisor",
                StageOutcome::Failed {
                    reason: reason.to_string(),
                },
                0,
                Vec::new(),
            );
            entry.detail = detail;
            state.record(entry);
        }
        self.transition(state, control, RunStatus::Failed);
        tracing::warn!(run_id = %state.run_id(), reason, "run failed");
        send_event(
            control.events.as_ref(),
            RunEvent::Failed {
                run_id: state.run_id().to_string(),
                reason: reason.to_string(),
            },
        );
        RunFailure {
            run_id: state.run_id().to_string(),
            reason: reason.to_string(),
            stage_history: state.history().to_vec(),
        }
    }

    /// 驱动一次运行直到 COMPLETED 或 FAILED
    pub async fn drive(&self, state: &mut PlanningState, control: &RunControl) -> Result<ItineraryResponse, RunFailure> {
        let orchestrator = &self.ctx.config.orchestrator;
        let max_steps = orchestrator.max_steps;
        let mut current = StageName::Researcher;
        let mut steps = 0u32;

        loop {
            if control.cancel.is_cancelled() {
                return Err(self.fail(state, control, "cancelled", None, true));
            }
            if control.deadline.is_some_and(|d| Instant::now() >= d) {
                let detail = Some("run deadline exceeded".to_string());
                return Err(self.fail(state, control, "cancelled", detail, true));
            }
            if steps >= max_steps {
                let detail = Some(format!("{} stage invocations, next was {}", steps, current));
                return Err(self.fail(state, control, "step budget exhausted", detail, true));
            }
            let Some(stage) = self.stages.get(current) else {
                let reason = format!("no stage registered for {}", current);
                return Err(self.fail(state, control, &reason, None, true));
            };
            steps += 1;

            self.transition(state, control, current.status());
            send_event(
                control.events.as_ref(),
                RunEvent::StageStarted {
                    run_id: state.run_id().to_string(),
                    stage: current,
                    step: steps,
                    max_steps,
                },
            );

            let flags_before = state.flags().len();
            let signal = stage.run(state, &self.ctx).await;
            let new_flags = state.flags()[flags_before..].to_vec();
            let detail = repeated_detail(&state.take_repeated_flags());
            for flag in &new_flags {
                send_event(
                    control.events.as_ref(),
                    RunEvent::FlagRaised {
                        run_id: state.run_id().to_string(),
                        flag: flag.clone(),
                    },
                );
            }
            tracing::info!(run_id = %state.run_id(), stage = %current, step = steps, signal = %signal, "stage finished");
            send_event(
                control.events.as_ref(),
                RunEvent::StageFinished {
                    run_id: state.run_id().to_string(),
                    stage: current,
                    signal: signal.to_string(),
                },
            );

            match signal {
                RoutingSignal::Continue(next) => {
                    let retries = state.retry_count(current);
                    state.record(with_detail(
                        record(current.as_str(), StageOutcome::Continue { next }, retries, new_flags),
                        detail,
                    ));
                    current = next;
                }
                RoutingSignal::Retry(target) => {
                    let count = state.bump_retry(target);
                    let budget = orchestrator.retry_budget(target);
                    state.record(with_detail(
                        record(current.as_str(), StageOutcome::Retry { stage: target }, count, new_flags),
                        detail,
                    ));
                    send_event(
                        control.events.as_ref(),
                        RunEvent::Retry {
                            run_id: state.run_id().to_string(),
                            stage: target,
                            retry_count: count,
                            budget,
                        },
                    );
                    if count > budget {
                        let detail = Some(format!("{} retried {} times, budget {}", target, count, budget));
                        return Err(self.fail(state, control, "retry budget exhausted", detail, true));
                    }
                    current = target;
                }
                RoutingSignal::Abort(reason) => {
                    let retries = state.retry_count(current);
                    state.record(with_detail(
                        record(
                            current.as_str(),
                            StageOutcome::Abort { reason: reason.clone() },
                            retries,
                            new_flags,
                        ),
                        detail,
                    ));
                    return Err(self.fail(state, control, &reason, None, false));
                }
                RoutingSignal::Done => {
                    let retries = state.retry_count(current);
                    state.record(with_detail(record(current.as_str(), StageOutcome::Done, retries, new_flags), detail));
                    self.transition(state, control, RunStatus::Reconciling);
                    let response = reconcile(state);
                    state.record(record("reconciliation", StageOutcome::Completed, 0, Vec::new()));
                    if let Some(tx) = &control.status_tx {
                        tx.send_replace(RunStatus::Completed);
                    }
                    send_event(
                        control.events.as_ref(),
                        RunEvent::StatusChanged {
                            run_id: state.run_id().to_string(),
                            status: RunStatus::Completed,
                        },
                    );
                    send_event(
                        control.events.as_ref(),
                        RunEvent::Completed {
                            run_id: state.run_id().to_string(),
                        },
                    );
                    tracing::info!(run_id = %state.run_id(), steps, total = response.cost.total, "run completed");
                    return Ok(response);
                }
            }
        }
    }
}
