//! Host implementation backed by lsblk/df and the filesystem grow tools

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use sysinfo::Disks;
use tokio::process::Command;
use tracing::debug;

use super::HostFilesystem;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Filesystem access via host commands and sysinfo
///
/// EBS volumes expose their volume id (minus the `vol-` prefix) as the
/// device serial, which is how mount points are resolved.
#[derive(Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }

    async fn device_for(&self, mount_point: &str) -> Result<String> {
        let output = run_command("df", &[mount_point, "--output=source"]).await?;

        parse_second_line(&output)
            .ok_or_else(|| anyhow!("unexpected 'df' output for '{}': {}", mount_point, output))
    }

    async fn filesystem_type(&self, device: &str) -> Result<String> {
        let output = run_command("lsblk", &["-f", device, "-o", "FSTYPE"]).await?;

        parse_second_line(&output)
            .ok_or_else(|| anyhow!("unexpected 'lsblk -f' output for '{}': {}", device, output))
    }

    fn disk_usage(&self, mount_point: &str) -> Result<(u64, u64)> {
        let disks = Disks::new_with_refreshed_list();

        for disk in disks.list() {
            if disk.mount_point().to_string_lossy() == mount_point {
                return Ok((disk.total_space(), disk.available_space()));
            }
        }

        bail!("no mounted filesystem found at '{}'", mount_point)
    }
}

#[async_trait]
impl HostFilesystem for LocalFilesystem {
    async fn mount_point(&self, volume_id: &str) -> Result<String> {
        let serial = volume_id.strip_prefix("vol-").unwrap_or(volume_id);

        let output = run_command("lsblk", &["-o", "NAME,MOUNTPOINT,SERIAL"]).await?;

        parse_mount_point(&output, serial)
            .ok_or_else(|| anyhow!("volume id {} not found in lsblk output", volume_id))
    }

    async fn filesystem_size_gib(&self, mount_point: &str) -> Result<f64> {
        let (total, _) = self
            .disk_usage(mount_point)
            .with_context(|| format!("failed to get disk usage for '{}'", mount_point))?;

        Ok(total as f64 / GIB)
    }

    async fn used_gib(&self, mount_point: &str) -> Result<f64> {
        let (total, available) = self
            .disk_usage(mount_point)
            .with_context(|| format!("failed to get disk utilization for '{}'", mount_point))?;

        Ok(total.saturating_sub(available) as f64 / GIB)
    }

    async fn grow(&self, mount_point: &str) -> Result<()> {
        let device = self.device_for(mount_point).await?;
        let fs_type = self.filesystem_type(&device).await?;

        let (program, args) = grow_command(&fs_type, &device)?;

        debug!(
            mount_point = %mount_point,
            device = %device,
            fs_type = %fs_type,
            program = %program,
            "Growing filesystem"
        );

        run_command(program, &args).await.with_context(|| {
            format!(
                "failed to run '{}' filesystem resizing command on host",
                program
            )
        })?;

        Ok(())
    }
}

/// Run a host command and return its stdout
async fn run_command(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("failed to execute '{}' command on host", program))?;

    if !output.status.success() {
        bail!(
            "'{}' exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Find the mount point in `lsblk -o NAME,MOUNTPOINT,SERIAL` output for a
/// device whose serial contains `serial`
fn parse_mount_point(output: &str, serial: &str) -> Option<String> {
    for line in output.lines() {
        if line.contains(serial) {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() > 1 {
                return Some(fields[1].to_string());
            }
        }
    }
    None
}

/// Return the value line of a single-column command output (header on the
/// first line, value on the second)
fn parse_second_line(output: &str) -> Option<String> {
    output
        .lines()
        .nth(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}

/// Pick the grow command for a filesystem type
fn grow_command<'a>(fs_type: &str, device: &'a str) -> Result<(&'static str, Vec<&'a str>)> {
    match fs_type {
        "ext4" => Ok(("resize2fs", vec![device])),
        "xfs" => Ok(("xfs_growfs", vec![device])),
        other => bail!("unsupported filesystem type: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LSBLK_OUTPUT: &str = "\
NAME    MOUNTPOINT SERIAL
xvda
├─xvda1 /          vol0a1b2c3d4e5f67890
xvdf    /data      vol0fedcba9876543210
";

    #[test]
    fn test_parse_mount_point_matches_serial() {
        let mount = parse_mount_point(LSBLK_OUTPUT, "vol0fedcba9876543210");
        assert_eq!(mount.as_deref(), Some("/data"));
    }

    #[test]
    fn test_parse_mount_point_missing_serial() {
        assert!(parse_mount_point(LSBLK_OUTPUT, "vol0000000000000000").is_none());
    }

    #[test]
    fn test_parse_mount_point_unmounted_device() {
        // A matching device with no mount point column yields nothing
        let output = "NAME MOUNTPOINT SERIAL\nxvdf\n";
        assert!(parse_mount_point(output, "xvdf").is_none());
    }

    #[test]
    fn test_parse_second_line() {
        assert_eq!(
            parse_second_line("Filesystem\n/dev/xvdf\n").as_deref(),
            Some("/dev/xvdf")
        );
        assert_eq!(
            parse_second_line("FSTYPE\n ext4 \n").as_deref(),
            Some("ext4")
        );
        assert!(parse_second_line("FSTYPE\n").is_none());
        assert!(parse_second_line("").is_none());
    }

    #[test]
    fn test_grow_command_by_fs_type() {
        let (program, args) = grow_command("ext4", "/dev/xvdf").unwrap();
        assert_eq!(program, "resize2fs");
        assert_eq!(args, vec!["/dev/xvdf"]);

        let (program, _) = grow_command("xfs", "/dev/xvdf").unwrap();
        assert_eq!(program, "xfs_growfs");
    }

    #[test]
    fn test_grow_command_rejects_unknown_fs() {
        assert!(grow_command("btrfs", "/dev/xvdf").is_err());
    }
}
