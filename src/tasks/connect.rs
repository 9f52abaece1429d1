//! Connection establishment: drive the greeting/CAPABILITY/LOGIN exchange
//! until the connection is usable, and a cheap front task other work can
//! depend on.

use std::io::Write;

use crate::command::Command;
use crate::conn::{CommandKind, ConnectionState};
use crate::engine::TaskId;
use crate::error::Result;
use crate::tasks::{Dispatch, Task, TaskCtx, TaskStatus};
use crate::types::{ResponseCode, State, Status};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Stage {
    AwaitGreeting,
    AwaitCapability,
    AwaitLogin,
    AwaitFinalCapability,
}

/// Brings a fresh transport to the authenticated state: consume the
/// greeting, learn capabilities, LOGIN, and re-learn capabilities if the
/// server did not volunteer them along the way. Terminates with the
/// connection `Ready` or `Failed`.
///
/// A `PREAUTH` greeting short-circuits the login. STARTTLS, when wanted,
/// has already happened at the transport layer before this task ever runs.
pub(crate) struct CreateConnection {
    username: String,
    password: String,
    greeting_pending: bool,
    stage: Stage,
    tag_capability: Option<String>,
    tag_login: Option<String>,
    tag_final: Option<String>,
}

impl CreateConnection {
    pub fn new(username: String, password: String, greeting_pending: bool) -> Self {
        CreateConnection {
            username,
            password,
            greeting_pending,
            stage: Stage::AwaitGreeting,
            tag_capability: None,
            tag_login: None,
            tag_final: None,
        }
    }

    fn absorb_code<W: Write>(&self, cx: &mut TaskCtx<'_, W>, state: &State) {
        if let Some(ResponseCode::Capabilities(caps)) = &state.code {
            cx.conn.capabilities.replace(caps.clone());
        }
    }

    fn submit_login<W: Write>(&mut self, id: TaskId, cx: &mut TaskCtx<'_, W>) -> Result<()> {
        let command = Command::Login {
            username: self.username.clone(),
            password: self.password.clone(),
        };
        self.tag_login = Some(cx.conn.submit(id, CommandKind::Login, None, &command)?);
        self.stage = Stage::AwaitLogin;
        Ok(())
    }

    fn submit_capability<W: Write>(
        &mut self,
        id: TaskId,
        cx: &mut TaskCtx<'_, W>,
        stage: Stage,
    ) -> Result<String> {
        let tag = cx
            .conn
            .submit(id, CommandKind::Capability, None, &Command::Capability)?;
        self.stage = stage;
        Ok(tag)
    }
}

impl<W: Write> Task<W> for CreateConnection {
    fn describe(&self) -> &'static str {
        "CreateConnection"
    }

    fn perform(&mut self, id: TaskId, cx: &mut TaskCtx<'_, W>) -> Result<TaskStatus> {
        if cx.conn.state() == ConnectionState::Failed {
            return Ok(TaskStatus::Failed("connection already failed".to_string()));
        }
        if !self.greeting_pending {
            // greeting was consumed during the transport-level STARTTLS dance
            let tag = self.submit_capability(id, cx, Stage::AwaitCapability)?;
            self.tag_capability = Some(tag);
        }
        Ok(TaskStatus::InProgress)
    }

    fn handle_state(
        &mut self,
        id: TaskId,
        cx: &mut TaskCtx<'_, W>,
        state: &State,
    ) -> Result<Dispatch> {
        let text = || state.information.clone().unwrap_or_default();

        if state.tag.is_none() {
            if self.stage != Stage::AwaitGreeting {
                return Ok(Dispatch::NotMine);
            }
            return match state.status {
                Status::Ok => {
                    self.absorb_code(cx, state);
                    if cx.conn.capabilities().is_empty() {
                        let tag = self.submit_capability(id, cx, Stage::AwaitCapability)?;
                        self.tag_capability = Some(tag);
                    } else {
                        self.submit_login(id, cx)?;
                    }
                    Ok(Dispatch::Handled)
                }
                Status::PreAuth => {
                    self.absorb_code(cx, state);
                    if cx.conn.capabilities().is_empty() {
                        let tag = self.submit_capability(id, cx, Stage::AwaitFinalCapability)?;
                        self.tag_final = Some(tag);
                        Ok(Dispatch::Handled)
                    } else {
                        cx.conn.state = ConnectionState::Ready;
                        Ok(Dispatch::Completed)
                    }
                }
                _ => Ok(Dispatch::Failed(format!("bad greeting: {}", text()))),
            };
        }

        if state.tag == self.tag_capability {
            return match state.status {
                Status::Ok => {
                    self.submit_login(id, cx)?;
                    Ok(Dispatch::Handled)
                }
                _ => Ok(Dispatch::Failed(format!("CAPABILITY failed: {}", text()))),
            };
        }
        if state.tag == self.tag_login {
            return match state.status {
                Status::Ok => {
                    self.absorb_code(cx, state);
                    if cx.conn.capabilities().is_empty() {
                        let tag = self.submit_capability(id, cx, Stage::AwaitFinalCapability)?;
                        self.tag_final = Some(tag);
                        Ok(Dispatch::Handled)
                    } else {
                        cx.conn.state = ConnectionState::Ready;
                        Ok(Dispatch::Completed)
                    }
                }
                _ => Ok(Dispatch::Failed(format!("login failed: {}", text()))),
            };
        }
        if state.tag == self.tag_final {
            return match state.status {
                Status::Ok => {
                    cx.conn.state = ConnectionState::Ready;
                    Ok(Dispatch::Completed)
                }
                _ => Ok(Dispatch::Failed(format!("CAPABILITY failed: {}", text()))),
            };
        }
        Ok(Dispatch::NotMine)
    }

    fn handle_capabilities(
        &mut self,
        _id: TaskId,
        cx: &mut TaskCtx<'_, W>,
        capabilities: &[String],
    ) -> Result<Dispatch> {
        cx.conn.capabilities.replace(capabilities.to_vec());
        Ok(Dispatch::Handled)
    }
}

/// Completes as soon as a usable connection exists. Work that merely needs
/// *a* connection depends on this instead of on the heavyweight
/// [`CreateConnection`]; the model wires the dependency when no connection
/// is ready yet.
pub(crate) struct GetAnyConnection;

impl<W: Write> Task<W> for GetAnyConnection {
    fn describe(&self) -> &'static str {
        "GetAnyConnection"
    }

    fn perform(&mut self, _id: TaskId, cx: &mut TaskCtx<'_, W>) -> Result<TaskStatus> {
        match cx.conn.state() {
            ConnectionState::Ready => Ok(TaskStatus::Completed),
            _ => Ok(TaskStatus::Failed("connection is not ready".to_string())),
        }
    }
}
