use clap::Args;

use warden_daemon::state::{AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Seed a bootstrap manager principal with this name; its secret key
    /// is written to `<name>.pem` in the state directory
    #[arg(long)]
    pub manager: Option<String>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = StateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::init(ctx.config_path.clone(), self.manager.as_deref())?;

        let mut out = format!("initialized state directory at {}", state.root.display());
        if let Some(name) = &self.manager {
            out.push_str(&format!(
                "\nmanager key written to {}",
                state.root.join(format!("{name}.pem")).display()
            ));
        }
        Ok(out)
    }
}
