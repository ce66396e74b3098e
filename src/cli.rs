use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::payload::{ContentIntent, WifiEncryption};
use crate::render::{CornerShape, EcLevel, ExportFormat, HexColor, LogoConfig, ModuleShape, StyleConfig};
use crate::settings::CONFIG_ENV;

#[derive(Parser, Debug)]
#[command(name = "qrkit", version, about = "Encode, render and scan QR codes")]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(long, global = true, env = CONFIG_ENV, help = "Settings file (JSON)")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a payload and optionally render it to an image.
    Encode {
        #[command(subcommand)]
        content: EncodeContent,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Read a QR code from an image file.
    Decode { file: PathBuf },
    /// Scan a live camera feed until a code is recognized.
    Scan {
        #[arg(long, help = "Directory of frames to replay as the camera feed")]
        frames: Option<PathBuf>,
        #[arg(long, help = "Sampling interval in milliseconds")]
        interval_ms: Option<u64>,
        #[arg(long, help = "Stop delivering frames after the last file; pair with --timeout-secs to end the scan")]
        once: bool,
        #[arg(long, help = "Give up after this many seconds")]
        timeout_secs: Option<u64>,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum EncodeContent {
    Link {
        url: String,
    },
    Text {
        text: String,
    },
    Wifi {
        #[arg(long)]
        ssid: String,
        #[arg(long, default_value = "")]
        password: String,
        #[arg(long, default_value = "WPA", help = "WPA, WEP or nopass")]
        encryption: WifiEncryption,
    },
    Email {
        to: String,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        body: String,
    },
    Phone {
        number: String,
    },
}

impl EncodeContent {
    pub fn into_intent(self) -> ContentIntent {
        match self {
            EncodeContent::Link { url } => ContentIntent::Link { url },
            EncodeContent::Text { text } => ContentIntent::FreeText { text },
            EncodeContent::Wifi {
                ssid,
                password,
                encryption,
            } => ContentIntent::WifiCredential {
                ssid,
                password,
                encryption,
            },
            EncodeContent::Email { to, subject, body } => {
                ContentIntent::EmailMessage { to, subject, body }
            }
            EncodeContent::Phone { number } => ContentIntent::PhoneNumber { number },
        }
    }
}

/// Rendering flags. Anything left unset comes from the saved style.
#[derive(Args, Debug, Default)]
pub struct OutputArgs {
    #[arg(long, global = true, help = "Write the rendered code to this file")]
    pub out: Option<PathBuf>,
    #[arg(long, global = true, value_enum, help = "Image format (default: from --out extension)")]
    pub format: Option<ExportFormat>,
    #[arg(long, global = true)]
    pub size: Option<u32>,
    #[arg(long, global = true)]
    pub margin: Option<u32>,
    #[arg(long = "ec", global = true, value_enum)]
    pub ec_level: Option<EcLevel>,
    #[arg(long, global = true, value_enum)]
    pub module_shape: Option<ModuleShape>,
    #[arg(long, global = true, value_enum)]
    pub corner_shape: Option<CornerShape>,
    #[arg(long, global = true, help = "Module color, e.g. #000000")]
    pub fg: Option<HexColor>,
    #[arg(long, global = true, help = "Background color, e.g. #ffffff")]
    pub bg: Option<HexColor>,
    #[arg(long, global = true)]
    pub transparent: bool,
    #[arg(long, global = true)]
    pub logo: Option<PathBuf>,
    #[arg(long, global = true, help = "Logo size as a fraction of the symbol")]
    pub logo_size: Option<f32>,
    #[arg(long, global = true, help = "Store these style flags as the new defaults")]
    pub save_style: bool,
}

impl OutputArgs {
    /// Overlays the flags that were given on top of `base`.
    pub fn apply(&self, mut base: StyleConfig) -> StyleConfig {
        if let Some(size) = self.size {
            base.size = size;
        }
        if let Some(margin) = self.margin {
            base.margin = margin;
        }
        if let Some(ec_level) = self.ec_level {
            base.ec_level = ec_level;
        }
        if let Some(shape) = self.module_shape {
            base.module_shape = shape;
        }
        if let Some(shape) = self.corner_shape {
            base.corner_shape = shape;
        }
        if let Some(fg) = self.fg {
            base.foreground = fg;
        }
        if let Some(bg) = self.bg {
            base.background = bg;
        }
        if self.transparent {
            base.transparent_background = true;
        }
        if let Some(path) = &self.logo {
            let logo = base.logo.get_or_insert_with(LogoConfig::default);
            logo.path = path.clone();
        }
        if let (Some(ratio), Some(logo)) = (self.logo_size, base.logo.as_mut()) {
            logo.size_ratio = ratio;
        }
        base
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective settings.
    Show,
    /// Restore default settings.
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn wifi_flags_become_an_intent() {
        let cli = Cli::try_parse_from([
            "qrkit", "encode", "wifi", "--ssid", "Home", "--password", "secret1",
        ])
        .unwrap();
        let Commands::Encode { content, .. } = cli.command else {
            panic!("expected encode");
        };
        assert_eq!(
            content.into_intent(),
            ContentIntent::WifiCredential {
                ssid: "Home".into(),
                password: "secret1".into(),
                encryption: WifiEncryption::Wpa,
            }
        );
    }

    #[test]
    fn style_flags_follow_the_content() {
        let cli = Cli::try_parse_from([
            "qrkit",
            "encode",
            "link",
            "https://example.com",
            "--out",
            "code.svg",
            "--module-shape",
            "classy-rounded",
            "--ec",
            "h",
            "--fg",
            "#112233",
        ])
        .unwrap();
        let Commands::Encode { output, .. } = cli.command else {
            panic!("expected encode");
        };
        let style = output.apply(StyleConfig::default());
        assert_eq!(style.module_shape, ModuleShape::ClassyRounded);
        assert_eq!(style.ec_level, EcLevel::H);
        assert_eq!(style.foreground.to_string(), "#112233");
        assert_eq!(style.size, 180);
        assert_eq!(output.out, Some(PathBuf::from("code.svg")));
    }

    #[test]
    fn bad_color_is_rejected_by_the_parser() {
        let result = Cli::try_parse_from(["qrkit", "encode", "text", "hi", "--fg", "black"]);
        assert!(result.is_err());
    }

    #[test]
    fn logo_size_without_logo_is_ignored() {
        let output = OutputArgs {
            logo_size: Some(0.2),
            ..OutputArgs::default()
        };
        assert!(output.apply(StyleConfig::default()).logo.is_none());
    }
}
