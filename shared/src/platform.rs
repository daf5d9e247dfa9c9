//! Device platforms and their CLI dialects

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Network operating system of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    AristaEos,
    #[default]
    CiscoIos,
    CiscoNxos,
    Generic,
    Juniper,
    JuniperJunos,
    MikrotikRouteros,
    MikrotikSwitchos,
    VyattaVyos,
    Vyos,
}

/// CLI commands that differ between platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformProfile {
    /// Sent once after login so output is not paginated
    pub disable_paging: Option<&'static str>,
    /// Privileged mode is entered with `enable`
    pub uses_enable: bool,
    /// Enters configuration mode
    pub config_enter: Option<&'static str>,
    /// Leaves configuration mode
    pub config_exit: Option<&'static str>,
    /// Prompt shows `(config...)` while in configuration mode
    pub marks_config_prompt: bool,
    /// Persists the running configuration
    pub save: &'static [&'static str],
    /// Save commands must be issued from configuration mode (commit style)
    pub save_in_config: bool,
    /// Appended to show commands when structured output is requested
    pub json_suffix: Option<&'static str>,
}

const IOS: PlatformProfile = PlatformProfile {
    disable_paging: Some("terminal length 0"),
    uses_enable: true,
    config_enter: Some("configure terminal"),
    config_exit: Some("end"),
    marks_config_prompt: true,
    save: &["write memory"],
    save_in_config: false,
    json_suffix: None,
};

const EOS: PlatformProfile = PlatformProfile {
    json_suffix: Some(" | json"),
    ..IOS
};

const NXOS: PlatformProfile = PlatformProfile {
    save: &["copy running-config startup-config"],
    json_suffix: Some(" | json"),
    ..IOS
};

const JUNOS: PlatformProfile = PlatformProfile {
    disable_paging: Some("set cli screen-length 0"),
    uses_enable: false,
    config_enter: Some("configure"),
    config_exit: Some("exit configuration-mode"),
    marks_config_prompt: false,
    save: &["commit"],
    save_in_config: true,
    json_suffix: Some(" | display json"),
};

const VYOS: PlatformProfile = PlatformProfile {
    disable_paging: Some("set terminal length 0"),
    uses_enable: false,
    config_enter: Some("configure"),
    config_exit: Some("exit"),
    marks_config_prompt: false,
    save: &["commit", "save"],
    save_in_config: true,
    json_suffix: None,
};

const ROUTEROS: PlatformProfile = PlatformProfile {
    disable_paging: None,
    uses_enable: false,
    config_enter: None,
    config_exit: None,
    marks_config_prompt: false,
    save: &[],
    save_in_config: false,
    json_suffix: None,
};

const GENERIC: PlatformProfile = PlatformProfile {
    disable_paging: None,
    ..IOS
};

impl Platform {
    pub const ALL: [Platform; 10] = [
        Platform::AristaEos,
        Platform::CiscoIos,
        Platform::CiscoNxos,
        Platform::Generic,
        Platform::Juniper,
        Platform::JuniperJunos,
        Platform::MikrotikRouteros,
        Platform::MikrotikSwitchos,
        Platform::VyattaVyos,
        Platform::Vyos,
    ];

    /// Inventory tag of this platform
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::AristaEos => "arista_eos",
            Platform::CiscoIos => "cisco_ios",
            Platform::CiscoNxos => "cisco_nxos",
            Platform::Generic => "generic",
            Platform::Juniper => "juniper",
            Platform::JuniperJunos => "juniper_junos",
            Platform::MikrotikRouteros => "mikrotik_routeros",
            Platform::MikrotikSwitchos => "mikrotik_switchos",
            Platform::VyattaVyos => "vyatta_vyos",
            Platform::Vyos => "vyos",
        }
    }

    /// CLI dialect of this platform
    pub fn profile(&self) -> PlatformProfile {
        match self {
            Platform::CiscoIos => IOS,
            Platform::AristaEos => EOS,
            Platform::CiscoNxos => NXOS,
            Platform::Juniper | Platform::JuniperJunos => JUNOS,
            Platform::VyattaVyos | Platform::Vyos => VYOS,
            Platform::MikrotikRouteros | Platform::MikrotikSwitchos => ROUTEROS,
            Platform::Generic => GENERIC,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown platform: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_tags_parse_back() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>(), Ok(platform));
        }
        assert!("cisco_xr".parse::<Platform>().is_err());
    }

    #[test]
    fn test_commit_style_platforms_save_in_config() {
        let junos = Platform::JuniperJunos.profile();
        assert!(junos.save_in_config);
        assert_eq!(junos.save, &["commit"]);
        assert!(!junos.uses_enable);

        let ios = Platform::CiscoIos.profile();
        assert!(!ios.save_in_config);
        assert_eq!(ios.config_enter, Some("configure terminal"));
    }

    #[test]
    fn test_routeros_has_no_config_mode() {
        let profile = Platform::MikrotikRouteros.profile();
        assert!(profile.config_enter.is_none());
        assert!(profile.save.is_empty());
    }
}
