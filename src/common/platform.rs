//! Runtime platform detection
//!
//! The driver download, the archive layout and the teardown strategy all key
//! off this tag so call sites never branch on `cfg!` themselves.

use std::fmt;

/// Supported platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOS,
    Windows,
}

/// CPU architecture family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
    Other,
}

impl Arch {
    /// Get the current architecture
    pub fn current() -> Self {
        #[cfg(target_arch = "x86_64")]
        return Arch::X86_64;

        #[cfg(target_arch = "aarch64")]
        return Arch::Aarch64;

        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        return Arch::Other;
    }
}

impl Platform {
    /// Get the current platform
    pub fn current() -> Self {
        #[cfg(target_os = "linux")]
        return Platform::Linux;

        #[cfg(target_os = "macos")]
        return Platform::MacOS;

        #[cfg(target_os = "windows")]
        return Platform::Windows;

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        return Platform::Linux; // Default fallback
    }

    /// Parse a platform name as used in scenario `skip_on` lists
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "linux" => Some(Platform::Linux),
            "macos" | "darwin" | "mac" => Some(Platform::MacOS),
            "windows" | "win" => Some(Platform::Windows),
            _ => None,
        }
    }

    /// Platform tag used by the driver version index
    pub fn driver_tag(self, arch: Arch) -> &'static str {
        match (self, arch) {
            (Platform::Linux, _) => "linux64",
            (Platform::MacOS, Arch::Aarch64) => "mac-arm64",
            (Platform::MacOS, _) => "mac-x64",
            (Platform::Windows, _) => "win64",
        }
    }

    /// Path of the driver binary inside the downloaded archive
    pub fn driver_entry(self, arch: Arch) -> String {
        let tag = self.driver_tag(arch);
        match self {
            Platform::Windows => format!("chromedriver-{}/chromedriver.exe", tag),
            _ => format!("chromedriver-{}/chromedriver", tag),
        }
    }

    /// Whether executables need the permission bit set after extraction
    pub fn needs_exec_bit(self) -> bool {
        !matches!(self, Platform::Windows)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Linux => write!(f, "linux"),
            Platform::MacOS => write!(f, "macos"),
            Platform::Windows => write!(f, "windows"),
        }
    }
}
