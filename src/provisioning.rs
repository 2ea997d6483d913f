//! The provisioning protocol: actions, the queue carrying them and the
//! dispatcher executing them.
//!
//! **Example** - Driving the dispatcher by hand:
//! ```ignore
//! let (queue, actions) = action_queue();
//! let mut dispatcher = Dispatcher::new(settings, session, host, console, queue.clone(), actions);
//! queue.send(Action::StartUms)?;
//! dispatcher.run()?;
//! ```

mod actions;
mod dispatcher;
mod handlers;
mod queue;
mod session;

pub use actions::Action;
pub use dispatcher::{provision, Dispatcher};
pub use handlers::{BOOT_COMMAND, INTERRUPT, UMS_COMMAND};
pub use queue::{action_queue, ActionReceiver, ActionSender, QUEUE_CAPACITY};
pub use session::Session;
