use clap::Parser;
use uniapi_common::GlobalConfigPatch;

#[derive(Parser, Debug)]
#[command(name = "uniapi", about = "OpenAI-compatible gateway over many vendor accounts")]
pub(crate) struct Cli {
    #[arg(long)]
    pub(crate) host: Option<String>,
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Key allowed on every route, including management.
    #[arg(long)]
    pub(crate) admin_key: Option<String>,
    /// Proxy-only key; repeat for several.
    #[arg(long = "api-key")]
    pub(crate) api_keys: Vec<String>,
    /// Upstream timeout in seconds.
    #[arg(long)]
    pub(crate) timeout_secs: Option<f64>,
    #[arg(long)]
    pub(crate) proxy: Option<String>,
    #[arg(long)]
    pub(crate) seed_file: Option<String>,
    /// Seed for candidate selection; picks are uniformly random when unset.
    #[arg(long)]
    pub(crate) selection_seed: Option<u64>,
}

impl Cli {
    pub(crate) fn patch(&self) -> GlobalConfigPatch {
        GlobalConfigPatch {
            host: self.host.clone(),
            port: self.port,
            admin_key: self.admin_key.clone(),
            api_keys: (!self.api_keys.is_empty()).then(|| self.api_keys.clone()),
            timeout_secs: self.timeout_secs,
            proxy: self.proxy.clone(),
            seed_file: self.seed_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_api_keys_are_collected() {
        let cli = Cli::parse_from([
            "uniapi",
            "--api-key",
            "k1",
            "--api-key",
            "k2",
            "--port",
            "9000",
        ]);
        let patch = cli.patch();
        assert_eq!(patch.api_keys, Some(vec!["k1".to_string(), "k2".to_string()]));
        assert_eq!(patch.port, Some(9000));
        assert_eq!(patch.host, None);
    }

    #[test]
    fn absent_flags_leave_lower_layers_alone() {
        let patch = Cli::parse_from(["uniapi"]).patch();
        assert_eq!(patch, GlobalConfigPatch::default());
    }
}
