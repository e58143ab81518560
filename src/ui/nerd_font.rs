/// Nerd font icons used in installer output.
///
/// Kept to the handful of glyphs the status lines and the hardware summary need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NerdFont {
    // Status and feedback
    Check,      //
    Cross,      //
    Warning,    //

    // System and hardware
    Desktop,    //
    Gear,       //
    Package,    //
    HardDrive,  //
    Server,     //
    Cpu,        //
    Memory,     //
    Gpu,        //
    PowerOff,   //
    Swap,       //
}

impl NerdFont {
    /// Get the Unicode character for this nerd font icon
    pub const fn unicode(&self) -> char {
        match self {
            Self::Check => '\u{f00c}',     // fa-check
            Self::Cross => '\u{f00d}',     // fa-times
            Self::Warning => '\u{f071}',   // fa-exclamation-triangle

            Self::Desktop => '\u{f108}',   // fa-desktop
            Self::Gear => '\u{f013}',      // fa-gear
            Self::Package => '\u{f187}',   // fa-archive (reused)
            Self::HardDrive => '\u{f0a0}', // fa-hdd
            Self::Server => '\u{f233}',    // fa-server
            Self::Cpu => '\u{f2db}',       // fa-microchip
            Self::Memory => '\u{f538}',    // fa-memory
            Self::Gpu => '\u{f26c}',       // fa-television (reused)
            Self::PowerOff => '\u{f011}',  // fa-power-off
            Self::Swap => '\u{f0ec}',      // fa-exchange
        }
    }
}

impl std::fmt::Display for NerdFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.unicode())
    }
}

impl From<NerdFont> for char {
    fn from(icon: NerdFont) -> Self {
        icon.unicode()
    }
}
