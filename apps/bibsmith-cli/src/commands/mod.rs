//! Subcommand implementations

pub mod build;
pub mod merge;
pub mod render;

use std::io::{BufRead, Write};
use std::rc::Rc;

use bibsmith_core::{CollisionPolicy, ConflictMode, Resolution};

use crate::prompt::{self, Shared};

/// The collision policy for a conflict mode
///
/// `ask` without a terminal keeps the existing entries.
pub fn collision_policy<R, W>(mode: ConflictMode, prompt: Option<&Shared<R, W>>) -> CollisionPolicy
where
    R: BufRead + 'static,
    W: Write + 'static,
{
    match mode.resolution() {
        Some(Resolution::Replace) => CollisionPolicy::Replace,
        Some(Resolution::Rename) => CollisionPolicy::Rename,
        Some(_) => CollisionPolicy::Reject,
        None => match prompt {
            Some(prompt) => CollisionPolicy::ask(prompt::collision_resolver(Rc::clone(prompt))),
            None => {
                tracing::warn!("No terminal to ask on; key collisions keep the existing entry");
                CollisionPolicy::Reject
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Prompt;
    use std::cell::RefCell;
    use std::io::Cursor;

    type TestPrompt = Shared<Cursor<Vec<u8>>, Vec<u8>>;

    #[test]
    fn test_fixed_modes() {
        let none: Option<&TestPrompt> = None;
        assert!(matches!(
            collision_policy(ConflictMode::First, none),
            CollisionPolicy::Reject
        ));
        assert!(matches!(
            collision_policy(ConflictMode::Last, none),
            CollisionPolicy::Replace
        ));
        assert!(matches!(
            collision_policy(ConflictMode::Rename, none),
            CollisionPolicy::Rename
        ));
        assert!(matches!(
            collision_policy(ConflictMode::Error, none),
            CollisionPolicy::Reject
        ));
    }

    #[test]
    fn test_ask_needs_a_terminal() {
        let none: Option<&TestPrompt> = None;
        assert!(matches!(
            collision_policy(ConflictMode::Ask, none),
            CollisionPolicy::Reject
        ));

        let prompt: TestPrompt = Rc::new(RefCell::new(Prompt::new(
            Cursor::new(b"2\n".to_vec()),
            Vec::new(),
        )));
        assert!(matches!(
            collision_policy(ConflictMode::Ask, Some(&prompt)),
            CollisionPolicy::Ask(_)
        ));
    }
}
