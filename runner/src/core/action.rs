//! Action interpreter: `JUMP:<id>`, `CALL:<group>`, `RETURN`.
//!
//! A pure reducer over the call stack. The raw instruction string is parsed once
//! into [`Action`] here and nowhere else.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::EngineError;
use crate::core::manifest::Manifest;
use crate::core::step_id::StepId;

/// A parsed control-flow instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Continue at `target`; the stack is untouched.
    Jump { target: StepId },
    /// Enter `group` at its entry step, pushing a return frame.
    Call { group: String },
    /// Pop the top return frame, or terminate when the stack is empty.
    Return,
}

/// Why an action string was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionParseError(pub String);

impl fmt::Display for ActionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ActionParseError {}

impl FromStr for Action {
    type Err = ActionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "RETURN" {
            return Ok(Action::Return);
        }
        let (verb, target) = s
            .split_once(':')
            .ok_or_else(|| ActionParseError("expected JUMP:<id>, CALL:<group> or RETURN".into()))?;
        if target.is_empty() {
            return Err(ActionParseError(format!("{verb} requires a target")));
        }
        match verb {
            "JUMP" => {
                let target =
                    StepId::parse(target).map_err(|err| ActionParseError(err.to_string()))?;
                Ok(Action::Jump { target })
            }
            "CALL" => {
                if target.contains(':') {
                    return Err(ActionParseError("CALL target must be a group name".into()));
                }
                Ok(Action::Call {
                    group: target.to_string(),
                })
            }
            "RETURN" => Err(ActionParseError("RETURN takes no target".into())),
            other => Err(ActionParseError(format!("unknown verb '{other}'"))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Jump { target } => write!(f, "JUMP:{target}"),
            Action::Call { group } => write!(f, "CALL:{group}"),
            Action::Return => f.write_str("RETURN"),
        }
    }
}

/// A pending return target on the call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Step that issued the call. Its group stays in the inheritance chain.
    pub caller: StepId,
    /// Step to continue at on return; `None` when the caller was the last step of
    /// its group, in which case returning keeps unwinding.
    pub resume: Option<StepId>,
}

/// What the engine needs to know about the step issuing an action.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    pub manifest: &'a Manifest,
    pub current: &'a StepId,
}

/// Result of reducing one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduction {
    pub next: Option<StepId>,
    pub stack: Vec<Frame>,
}

/// The return frame for a call issued at `current`: resume at the next declared
/// step of the same group.
pub fn return_frame(manifest: &Manifest, current: &StepId) -> Result<Frame, EngineError> {
    Ok(Frame {
        caller: current.clone(),
        resume: manifest.step_after(current)?,
    })
}

/// Parse `raw` and reduce it against `stack`.
pub fn interpret(
    raw: &str,
    stack: Vec<Frame>,
    site: &CallSite<'_>,
) -> Result<(Action, Reduction), EngineError> {
    let action = raw
        .parse::<Action>()
        .map_err(|err| EngineError::InvalidAction {
            step: site.current.clone(),
            raw: raw.to_string(),
            reason: err.0,
        })?;
    let reduction = reduce(&action, stack, site)?;
    Ok((action, reduction))
}

/// Apply a parsed action to the call stack.
pub fn reduce(
    action: &Action,
    mut stack: Vec<Frame>,
    site: &CallSite<'_>,
) -> Result<Reduction, EngineError> {
    match action {
        Action::Jump { target } => Ok(Reduction {
            next: Some(target.clone()),
            stack,
        }),
        Action::Call { group } => {
            let entry = site.manifest.entry_of(group)?;
            stack.push(return_frame(site.manifest, site.current)?);
            Ok(Reduction {
                next: Some(entry),
                stack,
            })
        }
        Action::Return => {
            while let Some(frame) = stack.pop() {
                if let Some(resume) = frame.resume {
                    return Ok(Reduction {
                        next: Some(resume),
                        stack,
                    });
                }
            }
            Ok(Reduction { next: None, stack })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ManifestBuilder, step};

    fn manifest() -> Manifest {
        ManifestBuilder::new()
            .group("Main", "A", |g| {
                g.step("A", step("tool")).step("B", step("tool"))
            })
            .group("Sub", "Begin", |g| g.step("Begin", step("tool")))
            .build()
    }

    fn frame(caller: &str, resume: Option<&str>) -> Frame {
        Frame {
            caller: StepId::parse(caller).expect("caller"),
            resume: resume.map(|id| StepId::parse(id).expect("resume")),
        }
    }

    /// JUMP, CALL and RETURN parse into their variants.
    #[test]
    fn parses_the_three_verbs() {
        assert_eq!(
            "JUMP:Main__Next".parse::<Action>(),
            Ok(Action::Jump {
                target: StepId::new("Main", "Next")
            })
        );
        assert_eq!(
            "CALL:Sub".parse::<Action>(),
            Ok(Action::Call {
                group: "Sub".to_string()
            })
        );
        assert_eq!("RETURN".parse::<Action>(), Ok(Action::Return));
    }

    /// Only the exact uppercase, colon-delimited forms parse.
    #[test]
    fn rejects_other_forms() {
        for raw in [
            "jump:Main__Next",
            "JUMP Main__Next",
            "JUMP:",
            "JUMP:Main",
            "RETURN:Main__A",
            "GOTO:Main__A",
            "return",
            "",
        ] {
            assert!(raw.parse::<Action>().is_err(), "{raw}");
        }
    }

    /// JUMP moves within the graph without touching the stack.
    #[test]
    fn jump_leaves_stack_untouched() {
        let manifest = manifest();
        let current = StepId::new("Main", "A");
        let site = CallSite {
            manifest: &manifest,
            current: &current,
        };
        let stack = vec![frame("Other__X", Some("Other__Y"))];

        let (_, reduction) = interpret("JUMP:Main__B", stack.clone(), &site).expect("jump");
        assert_eq!(reduction.next, Some(StepId::new("Main", "B")));
        assert_eq!(reduction.stack, stack);
    }

    /// CALL pushes the return frame and RETURN pops back to it.
    #[test]
    fn call_then_return_restores_stack() {
        let manifest = manifest();
        let caller = StepId::new("Main", "A");
        let base = vec![frame("Outer__X", Some("Outer__Y"))];

        let (_, called) = interpret(
            "CALL:Sub",
            base.clone(),
            &CallSite {
                manifest: &manifest,
                current: &caller,
            },
        )
        .expect("call");
        assert_eq!(called.next, Some(StepId::new("Sub", "Begin")));
        let mut expected = base.clone();
        expected.push(frame("Main__A", Some("Main__B")));
        assert_eq!(called.stack, expected);

        let callee = StepId::new("Sub", "Begin");
        let (_, returned) = interpret(
            "RETURN",
            called.stack,
            &CallSite {
                manifest: &manifest,
                current: &callee,
            },
        )
        .expect("return");
        assert_eq!(returned.next, Some(StepId::new("Main", "B")));
        assert_eq!(returned.stack, base);
    }

    /// RETURN with nothing to return to ends the run.
    #[test]
    fn return_on_empty_stack_terminates() {
        let manifest = manifest();
        let current = StepId::new("Main", "B");
        let site = CallSite {
            manifest: &manifest,
            current: &current,
        };
        let reduction = reduce(&Action::Return, Vec::new(), &site).expect("return");
        assert_eq!(reduction.next, None);
        assert!(reduction.stack.is_empty());
    }

    /// Frames pushed from a group's last step are unwound through.
    #[test]
    fn return_unwinds_through_frames_without_resume() {
        let manifest = manifest();
        let current = StepId::new("Sub", "Begin");
        let site = CallSite {
            manifest: &manifest,
            current: &current,
        };
        let stack = vec![
            frame("Outer__X", Some("Outer__Y")),
            frame("Main__B", None),
        ];
        let reduction = reduce(&Action::Return, stack, &site).expect("return");
        assert_eq!(reduction.next, Some(StepId::new("Outer", "Y")));
        assert!(reduction.stack.is_empty());
    }

    /// A CALL from the last step still pushes a frame, with no resume step.
    #[test]
    fn call_from_last_step_pushes_frame_without_resume() {
        let manifest = manifest();
        let current = StepId::new("Main", "B");
        let site = CallSite {
            manifest: &manifest,
            current: &current,
        };
        let reduction = reduce(
            &Action::Call {
                group: "Sub".to_string(),
            },
            Vec::new(),
            &site,
        )
        .expect("call");
        assert_eq!(reduction.stack, vec![frame("Main__B", None)]);
    }

    /// Calling an undeclared group is structural.
    #[test]
    fn call_to_unknown_group_is_fatal() {
        let manifest = manifest();
        let current = StepId::new("Main", "A");
        let site = CallSite {
            manifest: &manifest,
            current: &current,
        };
        let err = interpret("CALL:Missing", Vec::new(), &site).expect_err("unknown");
        assert!(matches!(err, EngineError::UnknownGroup { .. }));
    }

    /// A parse failure names the step that declared the action.
    #[test]
    fn malformed_action_reports_step() {
        let manifest = manifest();
        let current = StepId::new("Main", "A");
        let site = CallSite {
            manifest: &manifest,
            current: &current,
        };
        let err = interpret("JUMP:nowhere", Vec::new(), &site).expect_err("invalid");
        assert!(err.to_string().contains("Main__A"));
    }
}
