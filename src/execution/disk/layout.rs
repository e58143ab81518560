use serde::Serialize;
use thiserror::Error;

use super::device::TargetDevice;
use crate::engine::BootMode;
use crate::engine::config::LayoutConfig;

/// BIOS boot partition for GRUB's core image: 1 MiB to 3 MiB.
const BIOS_GRUB_START_MIB: u64 = 1;
const BIOS_GRUB_END_MIB: u64 = 3;
const FIRST_START_MIB: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableLabel {
    Gpt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionRole {
    Esp,
    BiosBoot,
    Boot,
    Root,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Filesystem {
    Fat32,
    Ext4,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionFlag {
    Esp,
    BiosGrub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionEnd {
    Mib(u64),
    Remaining,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionSpec {
    pub number: u32,
    pub role: PartitionRole,
    pub filesystem: Filesystem,
    pub start_mib: u64,
    pub end: PartitionEnd,
    pub flags: Vec<PartitionFlag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionPlan {
    pub label: TableLabel,
    pub partitions: Vec<PartitionSpec>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("partition plan is empty")]
    Empty,
    #[error("partition {number} is numbered out of order (expected {expected})")]
    Numbering { number: u32, expected: u32 },
    #[error("first partition must start at 1 MiB, found {found} MiB")]
    FirstStart { found: u64 },
    #[error("partition {number} starts at {found} MiB but the previous one ends at {expected} MiB")]
    Gap { number: u32, expected: u64, found: u64 },
    #[error("partition {number} ends at or before its start")]
    EmptyPartition { number: u32 },
    #[error("only the last partition may take the remaining space (partition {number})")]
    RemainingNotLast { number: u32 },
    #[error("the last partition must take the remaining space")]
    LastNotRemaining,
}

impl std::fmt::Display for PartitionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionRole::Esp => write!(f, "EFI system"),
            PartitionRole::BiosBoot => write!(f, "BIOS boot"),
            PartitionRole::Boot => write!(f, "boot"),
            PartitionRole::Root => write!(f, "root"),
        }
    }
}

impl std::fmt::Display for Filesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filesystem::Fat32 => write!(f, "fat32"),
            Filesystem::Ext4 => write!(f, "ext4"),
            Filesystem::None => write!(f, "none"),
        }
    }
}

impl PartitionFlag {
    pub fn parted_name(&self) -> &'static str {
        match self {
            PartitionFlag::Esp => "esp",
            PartitionFlag::BiosGrub => "bios_grub",
        }
    }
}

impl PartitionEnd {
    fn parted_arg(&self) -> String {
        match self {
            PartitionEnd::Mib(mib) => format!("{}MiB", mib),
            PartitionEnd::Remaining => "100%".to_string(),
        }
    }
}

impl PartitionRole {
    /// GPT partition name passed to `mkpart`.
    fn gpt_name(&self) -> &'static str {
        match self {
            PartitionRole::Esp => "ESP",
            PartitionRole::BiosBoot => "BIOS",
            PartitionRole::Boot => "boot",
            PartitionRole::Root => "root",
        }
    }
}

impl PartitionPlan {
    /// ESP + root.
    pub fn uefi(layout: &LayoutConfig) -> Self {
        let esp_end = FIRST_START_MIB + layout.esp_size_mib;
        Self {
            label: TableLabel::Gpt,
            partitions: vec![
                PartitionSpec {
                    number: 1,
                    role: PartitionRole::Esp,
                    filesystem: Filesystem::Fat32,
                    start_mib: FIRST_START_MIB,
                    end: PartitionEnd::Mib(esp_end),
                    flags: vec![PartitionFlag::Esp],
                },
                PartitionSpec {
                    number: 2,
                    role: PartitionRole::Root,
                    filesystem: Filesystem::Ext4,
                    start_mib: esp_end,
                    end: PartitionEnd::Remaining,
                    flags: Vec::new(),
                },
            ],
        }
    }

    /// bios_grub + boot + root, still on GPT.
    pub fn bios(layout: &LayoutConfig) -> Self {
        let boot_end = BIOS_GRUB_END_MIB + layout.boot_size_mib;
        Self {
            label: TableLabel::Gpt,
            partitions: vec![
                PartitionSpec {
                    number: 1,
                    role: PartitionRole::BiosBoot,
                    filesystem: Filesystem::None,
                    start_mib: BIOS_GRUB_START_MIB,
                    end: PartitionEnd::Mib(BIOS_GRUB_END_MIB),
                    flags: vec![PartitionFlag::BiosGrub],
                },
                PartitionSpec {
                    number: 2,
                    role: PartitionRole::Boot,
                    filesystem: Filesystem::Ext4,
                    start_mib: BIOS_GRUB_END_MIB,
                    end: PartitionEnd::Mib(boot_end),
                    flags: Vec::new(),
                },
                PartitionSpec {
                    number: 3,
                    role: PartitionRole::Root,
                    filesystem: Filesystem::Ext4,
                    start_mib: boot_end,
                    end: PartitionEnd::Remaining,
                    flags: Vec::new(),
                },
            ],
        }
    }

    pub fn for_boot_mode(mode: BootMode, layout: &LayoutConfig) -> Self {
        if mode.is_uefi() {
            Self::uefi(layout)
        } else {
            Self::bios(layout)
        }
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        let Some(last) = self.partitions.last() else {
            return Err(PlanError::Empty);
        };

        let mut previous_end = FIRST_START_MIB;
        for (index, part) in self.partitions.iter().enumerate() {
            let expected = index as u32 + 1;
            if part.number != expected {
                return Err(PlanError::Numbering {
                    number: part.number,
                    expected,
                });
            }

            if index == 0 {
                if part.start_mib != FIRST_START_MIB {
                    return Err(PlanError::FirstStart {
                        found: part.start_mib,
                    });
                }
            } else if part.start_mib != previous_end {
                return Err(PlanError::Gap {
                    number: part.number,
                    expected: previous_end,
                    found: part.start_mib,
                });
            }

            match part.end {
                PartitionEnd::Mib(end) => {
                    if end <= part.start_mib {
                        return Err(PlanError::EmptyPartition {
                            number: part.number,
                        });
                    }
                    previous_end = end;
                }
                PartitionEnd::Remaining => {
                    if part.number != last.number {
                        return Err(PlanError::RemainingNotLast {
                            number: part.number,
                        });
                    }
                }
            }
        }

        if last.end != PartitionEnd::Remaining {
            return Err(PlanError::LastNotRemaining);
        }
        Ok(())
    }

    pub fn find(&self, role: PartitionRole) -> Option<&PartitionSpec> {
        self.partitions.iter().find(|p| p.role == role)
    }

    pub fn root(&self) -> Option<&PartitionSpec> {
        self.find(PartitionRole::Root)
    }

    /// The partition mounted at /boot: the ESP on UEFI, the boot partition on BIOS.
    pub fn boot(&self) -> Option<&PartitionSpec> {
        self.find(PartitionRole::Esp)
            .or_else(|| self.find(PartitionRole::Boot))
    }

    /// Arguments to a single `parted` invocation that creates the whole table.
    pub fn parted_args(&self, device: &TargetDevice) -> Vec<String> {
        let mut args = vec![
            "--script".to_string(),
            device.path_str(),
            "mklabel".to_string(),
            "gpt".to_string(),
        ];

        for part in &self.partitions {
            args.push("mkpart".to_string());
            args.push(part.role.gpt_name().to_string());
            if part.filesystem != Filesystem::None {
                args.push(part.filesystem.to_string());
            }
            args.push(format!("{}MiB", part.start_mib));
            args.push(part.end.parted_arg());
        }

        for part in &self.partitions {
            for flag in &part.flags {
                args.push("set".to_string());
                args.push(part.number.to_string());
                args.push(flag.parted_name().to_string());
                args.push("on".to_string());
            }
        }

        args
    }

    /// One human-readable line per partition.
    pub fn describe(&self, device: &TargetDevice) -> Vec<String> {
        self.partitions
            .iter()
            .map(|p| {
                let size = match p.end {
                    PartitionEnd::Mib(end) => format!("{} MiB", end - p.start_mib),
                    PartitionEnd::Remaining => "remaining space".to_string(),
                };
                let flags: Vec<&str> = p.flags.iter().map(|f| f.parted_name()).collect();
                format!(
                    "{:<16} {:<10} {:<6} {:<16} {}",
                    device.partition_path(p.number),
                    p.role.to_string(),
                    p.filesystem.to_string(),
                    size,
                    flags.join(",")
                )
                .trim_end()
                .to_string()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uefi_plan_has_esp_and_root() {
        let plan = PartitionPlan::uefi(&LayoutConfig::default());
        plan.validate().unwrap();
        assert_eq!(plan.partitions.len(), 2);

        let esp = &plan.partitions[0];
        assert_eq!(esp.role, PartitionRole::Esp);
        assert_eq!(esp.filesystem, Filesystem::Fat32);
        assert_eq!(esp.flags, vec![PartitionFlag::Esp]);
        assert_eq!(esp.start_mib, 1);
        assert_eq!(esp.end, PartitionEnd::Mib(2049));

        let root = &plan.partitions[1];
        assert_eq!(root.role, PartitionRole::Root);
        assert_eq!(root.filesystem, Filesystem::Ext4);
        assert_eq!(root.start_mib, 2049);
        assert_eq!(root.end, PartitionEnd::Remaining);
    }

    #[test]
    fn test_bios_plan_has_bios_grub_first() {
        let plan = PartitionPlan::bios(&LayoutConfig::default());
        plan.validate().unwrap();
        assert_eq!(plan.label, TableLabel::Gpt);
        assert_eq!(plan.partitions.len(), 3);

        let grub = &plan.partitions[0];
        assert_eq!(grub.flags, vec![PartitionFlag::BiosGrub]);
        assert_eq!(grub.filesystem, Filesystem::None);
        assert_eq!((grub.start_mib, grub.end), (1, PartitionEnd::Mib(3)));

        assert_eq!(plan.partitions[1].role, PartitionRole::Boot);
        assert_eq!(plan.partitions[1].end, PartitionEnd::Mib(1027));
        assert_eq!(plan.boot().map(|p| p.number), Some(2));
        assert_eq!(plan.root().map(|p| p.number), Some(3));
    }

    #[test]
    fn test_plans_are_deterministic() {
        let layout = LayoutConfig::default();
        let sdb = TargetDevice::describe("/dev/sdb").unwrap();
        for mode in [BootMode::UEFI64, BootMode::BIOS] {
            let a = PartitionPlan::for_boot_mode(mode, &layout);
            let b = PartitionPlan::for_boot_mode(mode, &layout);
            assert_eq!(a, b);
            assert_eq!(a.parted_args(&sdb), b.parted_args(&sdb));
        }
    }

    #[test]
    fn test_parted_args_for_sdb_uefi() {
        let sdb = TargetDevice::describe("/dev/sdb").unwrap();
        let plan = PartitionPlan::for_boot_mode(BootMode::UEFI64, &LayoutConfig::default());
        assert_eq!(
            plan.parted_args(&sdb).join(" "),
            "--script /dev/sdb mklabel gpt \
             mkpart ESP fat32 1MiB 2049MiB \
             mkpart root ext4 2049MiB 100% \
             set 1 esp on"
        );
    }

    #[test]
    fn test_parted_args_for_bios_skip_filesystem_of_grub_partition() {
        let sdb = TargetDevice::describe("/dev/sdb").unwrap();
        let plan = PartitionPlan::bios(&LayoutConfig::default());
        let args = plan.parted_args(&sdb).join(" ");
        assert!(args.contains("mkpart BIOS 1MiB 3MiB"));
        assert!(args.contains("mkpart boot ext4 3MiB 1027MiB"));
        assert!(args.ends_with("set 1 bios_grub on"));
    }

    #[test]
    fn test_nvme_partition_names_in_description() {
        let nvme = TargetDevice::describe("/dev/nvme0n1").unwrap();
        let plan = PartitionPlan::uefi(&LayoutConfig::default());
        let lines = plan.describe(&nvme);
        assert!(lines[0].starts_with("/dev/nvme0n1p1"));
        assert!(lines[0].ends_with("esp"));
        assert!(lines[1].starts_with("/dev/nvme0n1p2"));
        assert!(lines[1].contains("remaining space"));
    }

    #[test]
    fn test_validate_rejects_broken_plans() {
        let mut plan = PartitionPlan::uefi(&LayoutConfig::default());
        plan.partitions[1].start_mib = 3000;
        assert_eq!(
            plan.validate(),
            Err(PlanError::Gap {
                number: 2,
                expected: 2049,
                found: 3000
            })
        );

        let mut plan = PartitionPlan::uefi(&LayoutConfig::default());
        plan.partitions[0].start_mib = 0;
        assert_eq!(plan.validate(), Err(PlanError::FirstStart { found: 0 }));

        let mut plan = PartitionPlan::uefi(&LayoutConfig::default());
        plan.partitions[1].end = PartitionEnd::Mib(4000);
        assert_eq!(plan.validate(), Err(PlanError::LastNotRemaining));

        let mut plan = PartitionPlan::bios(&LayoutConfig::default());
        plan.partitions[1].end = PartitionEnd::Remaining;
        assert_eq!(
            plan.validate(),
            Err(PlanError::RemainingNotLast { number: 2 })
        );

        let mut plan = PartitionPlan::uefi(&LayoutConfig::default());
        plan.partitions[0].end = PartitionEnd::Mib(1);
        assert_eq!(plan.validate(), Err(PlanError::EmptyPartition { number: 1 }));

        let empty = PartitionPlan {
            label: TableLabel::Gpt,
            partitions: Vec::new(),
        };
        assert_eq!(empty.validate(), Err(PlanError::Empty));
    }
}
