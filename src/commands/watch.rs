//! The interactive `watch` session: live table plus operator commands on stdin.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use crate::api::HttpDashboardClient;
use crate::config::DashboardConfig;
use crate::core::{ActionRequest, FlowFilter};
use crate::error::AppError;
use crate::push::PushTransport;
use crate::services::{FlowView, ViewCommand};
use crate::ui::{table, TableRenderer, TracingNotifier};

use super::logic::{apply_filter_change, parse_operator_command, OperatorCommand, HELP};

/// What the session should do with one parsed line.
pub enum Step {
    Send(ViewCommand),
    ListCandidates,
    PrintHelp,
    Quit,
}

/// Map an operator command onto the view, updating the session's table filter.
pub fn plan(command: OperatorCommand, filter: &mut FlowFilter) -> Step {
    if apply_filter_change(filter, &command) {
        return Step::Send(ViewCommand::SetFilter(filter.clone()));
    }
    match command {
        OperatorCommand::Block { ip, reason } => Step::Send(ViewCommand::Act(ActionRequest::block(ip, reason))),
        OperatorCommand::Release { ip, note } => Step::Send(ViewCommand::Act(ActionRequest::release(ip, note))),
        OperatorCommand::Note { ip, text } => Step::Send(ViewCommand::Note { ip, text }),
        OperatorCommand::Select(ip) => Step::Send(ViewCommand::Select(ip)),
        OperatorCommand::VerificationNote { ip, note } => {
            Step::Send(ViewCommand::VerificationNote { ip, note })
        }
        OperatorCommand::Verify { ip: Some(ip), action } => Step::Send(ViewCommand::Decide { ip, action }),
        OperatorCommand::Verify { ip: None, action } => Step::Send(ViewCommand::Bulk(action)),
        OperatorCommand::Candidates => Step::ListCandidates,
        OperatorCommand::Clear => Step::Send(ViewCommand::Clear),
        OperatorCommand::Help => Step::PrintHelp,
        OperatorCommand::Quit => Step::Quit,
        OperatorCommand::Search(_) | OperatorCommand::StatusFilter(_) => {
            Step::Send(ViewCommand::SetFilter(filter.clone()))
        }
    }
}

/// Run until the operator quits or presses Ctrl+C.
pub async fn run_watch(config: DashboardConfig, with_push: bool) -> Result<(), AppError> {
    let api = Arc::new(HttpDashboardClient::new(&config.server_url)?);
    tracing::info!("Watching {} as {}", config.server_url, config.operator);

    let (transport, push_rx) = if with_push {
        let (transport, rx) = PushTransport::spawn(config.push_url.clone(), config.reconnect);
        (Some(transport), rx)
    } else {
        let (_tx, rx) = mpsc::channel(1);
        (None, rx)
    };

    let mut view = FlowView::new(api, config, TableRenderer::stdout(), TracingNotifier);
    if let Some(transport) = &transport {
        view = view.with_outbound(transport.sender());
    }
    let (commands, commands_rx) = mpsc::channel(crate::config::CHANNEL_CAPACITY);
    let view_task = tokio::spawn(view.run(commands_rx, push_rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut filter = FlowFilter::default();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_operator_command(&line) {
                    Ok(Some(command)) => match plan(command, &mut filter) {
                        Step::Send(command) => send(&commands, command).await?,
                        Step::ListCandidates => {
                            let (reply, rx) = oneshot::channel();
                            send(&commands, ViewCommand::Candidates(reply)).await?;
                            let candidates = rx
                                .await
                                .map_err(|_| AppError::Channel("flow view stopped".into()))?;
                            print!("{}", table::render_table(&candidates));
                        }
                        Step::PrintHelp => println!("{HELP}"),
                        Step::Quit => break,
                    },
                    Ok(None) => {}
                    Err(e) => tracing::warn!("{e}"),
                },
                Ok(None) => {
                    tracing::debug!("stdin closed; watching until Ctrl+C");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {e}");
                    stdin_open = false;
                }
            },
        }
    }

    let _ = commands.send(ViewCommand::Shutdown).await;
    if let Err(e) = view_task.await {
        tracing::error!("Flow view task failed: {e}");
    }
    drop(transport);
    Ok(())
}

async fn send(commands: &mpsc::Sender<ViewCommand>, command: ViewCommand) -> Result<(), AppError> {
    commands
        .send(command)
        .await
        .map_err(|_| AppError::Channel("flow view stopped".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FlowStatus, StatusAction};

    fn plan_line(line: &str, filter: &mut FlowFilter) -> Step {
        let command = parse_operator_command(line).unwrap().unwrap();
        plan(command, filter)
    }

    #[test]
    fn test_filters_accumulate() {
        let mut filter = FlowFilter::default();
        let _ = plan_line("search 10.0", &mut filter);
        let step = plan_line("status blocked", &mut filter);
        let Step::Send(ViewCommand::SetFilter(sent)) = step else {
            panic!("expected a filter update");
        };
        assert_eq!(sent.ip_substring.as_deref(), Some("10.0"));
        assert_eq!(sent.status, Some(FlowStatus::Blocked));
    }

    #[test]
    fn test_block_becomes_optimistic_action() {
        let mut filter = FlowFilter::default();
        let Step::Send(ViewCommand::Act(request)) = plan_line("block 10.0.0.50", &mut filter) else {
            panic!("expected an action");
        };
        assert_eq!(request.action, StatusAction::Block);
        assert_eq!(request.reason.as_deref(), Some("manual"));
    }

    #[test]
    fn test_verify_routes_single_and_bulk() {
        let mut filter = FlowFilter::default();
        assert!(matches!(
            plan_line("verify block 10.0.0.50", &mut filter),
            Step::Send(ViewCommand::Decide { action: StatusAction::Block, .. })
        ));
        assert!(matches!(
            plan_line("verify release", &mut filter),
            Step::Send(ViewCommand::Bulk(StatusAction::Release))
        ));
    }

    #[test]
    fn test_session_only_steps() {
        let mut filter = FlowFilter::default();
        assert!(matches!(plan_line("help", &mut filter), Step::PrintHelp));
        assert!(matches!(plan_line("candidates", &mut filter), Step::ListCandidates));
        assert!(matches!(plan_line("quit", &mut filter), Step::Quit));
    }
}
