use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;

/// One line of `/proc/self/mounts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub target: PathBuf,
}

pub fn get_total_ram_bytes() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_mem_total_bytes(&meminfo)
}

pub fn parse_mem_total_bytes(meminfo: &str) -> Option<u64> {
    for line in meminfo.lines() {
        if line.starts_with("MemTotal:") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                let kb: u64 = parts[1].parse().ok()?;
                return kb.checked_mul(1024);
            }
        }
    }
    None
}

/// Undo the octal escapes the kernel uses for spaces and friends in mount paths.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = (bytes[i] == b'\\' && i + 3 < bytes.len())
            .then(|| &bytes[i + 1..i + 4])
            .filter(|digits| digits.iter().all(|b| (b'0'..=b'7').contains(b)))
            .map(|digits| digits.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0')))
            .and_then(|value| u8::try_from(value).ok());
        if let Some(value) = escaped {
            out.push(value);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).to_string()
}

pub fn parse_mounts(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let target = fields.next()?;
            Some(MountEntry {
                source: unescape_mount_field(source),
                target: PathBuf::from(unescape_mount_field(target)),
            })
        })
        .collect()
}

pub fn read_mounts() -> Result<Vec<MountEntry>> {
    let content =
        std::fs::read_to_string("/proc/self/mounts").context("Failed to read /proc/self/mounts")?;
    Ok(parse_mounts(&content))
}

/// Active swap areas (devices or files) from `/proc/swaps`.
pub fn parse_proc_swaps(content: &str) -> Vec<String> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(unescape_mount_field)
        .collect()
}

pub fn read_active_swaps() -> Result<Vec<String>> {
    let content = std::fs::read_to_string("/proc/swaps").context("Failed to read /proc/swaps")?;
    Ok(parse_proc_swaps(&content))
}

/// `pvs --noheadings -o pv_name,vg_name` output as (pv, vg) pairs. PVs without a VG are skipped.
pub fn parse_pvs(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pv = fields.next()?;
            let vg = fields.next()?;
            Some((pv.to_string(), vg.to_string()))
        })
        .collect()
}

pub fn get_current_partitions(disk_path: &str) -> Result<Vec<String>> {
    let output = Command::new("lsblk")
        .args(["-n", "-o", "NAME", "-r", disk_path])
        .output()
        .context("Failed to run lsblk")?;

    if !output.status.success() {
        anyhow::bail!(
            "lsblk failed for {}: {}",
            disk_path,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let disk_name = disk_path.strip_prefix("/dev/").unwrap_or(disk_path);

    Ok(stdout
        .lines()
        .filter(|l| l.starts_with(disk_name))
        .filter(|l| *l != disk_name)
        .map(|name| format!("/dev/{}", name))
        .collect())
}

/// Run blkid for a single tag and return its value, if any.
fn blkid_value(tag: &str, device: &str) -> Result<Option<String>> {
    let output = Command::new("blkid")
        .args(["-o", "value", "-s", tag, device])
        .output()
        .with_context(|| format!("Failed to run blkid on {}", device))?;

    // blkid exits with 2 when the tag is not present
    if !output.status.success() {
        return Ok(None);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let value = stdout.lines().next().unwrap_or("").trim().to_string();
    Ok(if value.is_empty() { None } else { Some(value) })
}

pub fn get_fs_type(device: &str) -> Result<Option<String>> {
    blkid_value("TYPE", device)
}

pub fn get_fs_uuid(device: &str) -> Result<Option<String>> {
    blkid_value("UUID", device)
}

/// The whole disk that backs `/`, e.g. `/dev/sda`. `None` on the live ISO,
/// where the root is an overlay.
pub fn get_root_disk() -> Result<Option<String>> {
    let output = Command::new("findmnt")
        .args(["-n", "-o", "SOURCE", "/"])
        .output()
        .context("Failed to run findmnt")?;
    let source = String::from_utf8_lossy(&output.stdout).trim().to_string();
    // btrfs subvolumes show up as /dev/sda2[/@]
    let source = source.split('[').next().unwrap_or("").to_string();
    if !source.starts_with("/dev/") {
        return Ok(None);
    }

    let output = Command::new("lsblk")
        .args(["-n", "-o", "PKNAME", &source])
        .output()
        .context("Failed to run lsblk")?;
    let parent = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .to_string();

    if parent.is_empty() {
        Ok(Some(source))
    } else {
        Ok(Some(format!("/dev/{}", parent)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mem_total_bytes() {
        let meminfo = "MemTotal:        8388608 kB\nMemFree:         1024 kB\n";
        assert_eq!(parse_mem_total_bytes(meminfo), Some(8 * 1024 * 1024 * 1024));
        assert_eq!(parse_mem_total_bytes("MemFree: 12 kB\n"), None);
        assert_eq!(parse_mem_total_bytes("MemTotal: lots kB\n"), None);
    }

    #[test]
    fn test_parse_mounts_unescapes_spaces() {
        let content = "\
/dev/sdb2 /mnt ext4 rw,relatime 0 0
/dev/sdb1 /mnt/boot vfat rw 0 0
/dev/sdc1 /run/media/my\\040disk ext4 rw 0 0
proc /proc proc rw 0 0";
        let mounts = parse_mounts(content);
        assert_eq!(mounts.len(), 4);
        assert_eq!(mounts[0].source, "/dev/sdb2");
        assert_eq!(mounts[1].target, PathBuf::from("/mnt/boot"));
        assert_eq!(mounts[2].target, PathBuf::from("/run/media/my disk"));
    }

    #[test]
    fn test_unescape_mount_field_keeps_out_of_range_escapes() {
        assert_eq!(unescape_mount_field("a\\011b"), "a\tb");
        assert_eq!(unescape_mount_field("back\\134slash"), "back\\slash");
        assert_eq!(unescape_mount_field("odd\\400"), "odd\\400");
        assert_eq!(unescape_mount_field("short\\04"), "short\\04");
    }

    #[test]
    fn test_parse_proc_swaps() {
        let content = "\
Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority
/dev/sdb3                               partition\t8388604\t\t0\t\t-2
/mnt/swapfile                           file\t\t9646900\t\t0\t\t-3
";
        assert_eq!(
            parse_proc_swaps(content),
            vec!["/dev/sdb3".to_string(), "/mnt/swapfile".to_string()]
        );
        assert!(parse_proc_swaps("Filename Type Size Used Priority\n").is_empty());
    }

    #[test]
    fn test_parse_pvs() {
        let output = "  /dev/sdb2   vg0\n  /dev/sdc1\n  /dev/nvme0n1p3 data\n";
        assert_eq!(
            parse_pvs(output),
            vec![
                ("/dev/sdb2".to_string(), "vg0".to_string()),
                ("/dev/nvme0n1p3".to_string(), "data".to_string()),
            ]
        );
    }
}
