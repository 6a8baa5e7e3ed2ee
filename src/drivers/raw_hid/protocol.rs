/// Output report layouts used by the Blynclight generations.
///
/// Which one a given unit understands is not discoverable, so every layout
/// is sent on each color change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportLayout {
    Standard,
    Plus,
    ExtendedPlus,
}

impl ReportLayout {
    pub const ALL: [ReportLayout; 3] = [
        ReportLayout::Standard,
        ReportLayout::Plus,
        ReportLayout::ExtendedPlus,
    ];

    pub fn to_bytes(self, red: u8, green: u8, blue: u8) -> [u8; 9] {
        match self {
            ReportLayout::Standard => [0x00, red, blue, green, 0x08, 0x00, 0x00, 0x00, 0x00],
            ReportLayout::Plus => [0x00, red, blue, green, 0x00, 0x00, 0x00, 0x00, 0x05],
            ReportLayout::ExtendedPlus => [0x00, red, blue, green, 0xFF, 0x00, 0x00, 0x00, 0x09],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ReportLayout;

    #[test]
    fn layouts_swap_blue_and_green() {
        assert_eq!(
            ReportLayout::Standard.to_bytes(0x11, 0x22, 0x33),
            [0x00, 0x11, 0x33, 0x22, 0x08, 0, 0, 0, 0]
        );
        assert_eq!(
            ReportLayout::Plus.to_bytes(0x11, 0x22, 0x33),
            [0x00, 0x11, 0x33, 0x22, 0x00, 0, 0, 0, 0x05]
        );
        assert_eq!(
            ReportLayout::ExtendedPlus.to_bytes(0x11, 0x22, 0x33),
            [0x00, 0x11, 0x33, 0x22, 0xFF, 0, 0, 0, 0x09]
        );
    }
}
