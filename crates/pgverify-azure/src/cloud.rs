/// Endpoints of the Azure public cloud. Sovereign clouds are not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEndpoints {
    /// ARM control plane.
    pub management: String,
    /// Entra ID authority host.
    pub login: String,
    /// Instance Metadata Service, used for VM / VMSS managed identity.
    pub imds: String,
}

impl CloudEndpoints {
    pub fn public() -> Self {
        Self {
            management: "https://management.azure.com".into(),
            login:      "https://login.microsoftonline.com".into(),
            imds:       "http://169.254.169.254".into(),
        }
    }

    /// Point every endpoint at one base URL. Used with mock servers.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self { management: base.clone(), login: base.clone(), imds: base }
    }

    /// OAuth scope for tokens presented to the management endpoint.
    pub fn management_scope(&self) -> String {
        "https://management.azure.com/.default".into()
    }

    /// Resource identifier in the v1 token form used by IMDS and App Service.
    pub fn management_resource(&self) -> String {
        "https://management.azure.com/".into()
    }
}

impl Default for CloudEndpoints {
    fn default() -> Self {
        Self::public()
    }
}
