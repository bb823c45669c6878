//! Concrete controllers and their channel types.

use std::sync::Arc;

use crate::context::Context;
use crate::controller::Controller;
use crate::router::Router;

pub mod decrypt;
pub mod import;
pub mod keygen;
pub mod pwd_dialog;
pub mod sync_handler;

pub use decrypt::DecryptController;
pub use import::ImportController;
pub use keygen::KeyGenController;
pub use pwd_dialog::PwdDialogController;
pub use sync_handler::SyncHandlerController;

/// Inline frame showing an encrypted message.
pub const D_FRAME: &str = "dFrame";
/// Reader dialog of a decrypt frame.
pub const D_DIALOG: &str = "dDialog";
pub const PWD_DIALOG: &str = "pwdDialog";
pub const IMPORT_KEY_DIALOG: &str = "importKeyDialog";
pub const KEY_GEN_CONT: &str = "keyGenCont";
pub const KEY_GEN_DIALOG: &str = "keyGenDialog";
pub const SYNC_HANDLER: &str = "syncHandler";

/// Register every controller type with `router`.
pub fn register_all(router: &Router, context: &Arc<Context>) {
    let ctx = context.clone();
    router.register(D_FRAME, move |base| {
        Box::new(DecryptController::new(base, ctx.clone())) as Box<dyn Controller>
    });
    router.register_secondary(D_DIALOG, D_FRAME);

    let ctx = context.clone();
    router.register(PWD_DIALOG, move |base| {
        Box::new(PwdDialogController::new(base, ctx.clone())) as Box<dyn Controller>
    });

    let ctx = context.clone();
    router.register(IMPORT_KEY_DIALOG, move |base| {
        Box::new(ImportController::new(base, ctx.clone())) as Box<dyn Controller>
    });

    let ctx = context.clone();
    router.register(KEY_GEN_CONT, move |base| {
        Box::new(KeyGenController::new(base, ctx.clone())) as Box<dyn Controller>
    });
    router.register_secondary(KEY_GEN_DIALOG, KEY_GEN_CONT);

    let ctx = context.clone();
    router.register(SYNC_HANDLER, move |base| {
        Box::new(SyncHandlerController::new(base, ctx.clone())) as Box<dyn Controller>
    });
}
