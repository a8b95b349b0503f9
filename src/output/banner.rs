//! Startup banners

use crate::output::OutputManager;

pub const ANSI_VIOLET: &str = "\x1b[38;5;141m";
pub const ANSI_RESET: &str = "\x1b[0m";

const LOGO: &str = r"   __  ___ ____   ____   ____ ____    ____  ___
  /  |/  // __ \ / __ \ / __// __/   |_  / / _ \
 / /|_/ // /_/ // /_/ /_\ \ / _/    _/_ < / // /
/_/  /_/ \____/ \____//___//___/   /____/(_)___/";

impl OutputManager {
    pub fn display_logo(&self) {
        self.console_update(" ");
        self.console_update(&format!("{}{}{}", ANSI_VIOLET, LOGO, ANSI_RESET));
        self.console_update(&format!(
            "{} A part of the ENHANCE community. Join us at www.enhance.pet to build the future of PET imaging together.{}",
            ANSI_VIOLET, ANSI_RESET
        ));
        self.console_update(" ");
    }

    pub fn display_authors(&self) {
        self.console_update(&format!("{} 🖥️  AUTHORS:{}", ANSI_VIOLET, ANSI_RESET));
        self.console_update(" ");
        self.console_update(
            " The Three Moose-keteers 🤺: Lalith Kumar Shiyam Sundar | Sebastian Gutschmayer | Manuel Pires",
        );
        self.console_update(" ");
    }

    /// Manuscript citation
    pub fn display_doi(&self) {
        self.console_update(&format!("{} 📜 CITATION:{}", ANSI_VIOLET, ANSI_RESET));
        self.console_update(" ");
        self.console_update(
            " Fully Automated, Semantic Segmentation of Whole-Body [18F]-FDG PET/CT Images Based on Data-Centric Artificial Intelligence",
        );
        self.console_update(" 10.2967/jnumed.122.264063");
        self.console_update(" ");
        self.console_update(
            " Copyright 2022, Quantitative Imaging and Medical Physics Team, Medical University of Vienna",
        );
    }
}
