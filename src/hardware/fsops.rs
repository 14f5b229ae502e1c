//! Filesystem Operations
//!
//! FilesystemOps adapter that shells out to the node's mkfs and mount
//! binaries. The reconciler only ever calls these after validating the
//! stored intent, so failures are reported back as conditions rather
//! than retried here.

use crate::domain::ports::FilesystemOps;
use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

/// FilesystemOps adapter over the system mkfs/mount binaries
#[derive(Debug, Default)]
pub struct SystemFilesystemOps;

impl SystemFilesystemOps {
    pub fn new() -> Self {
        Self
    }

    /// mkfs invocation for the given filesystem type; ext4 and xfs need a
    /// force flag to overwrite an existing signature
    fn mkfs_command(fs_type: &str, dev_path: &str) -> Command {
        let mut cmd = Command::new(format!("mkfs.{}", fs_type));
        match fs_type {
            "ext4" => {
                cmd.arg("-F");
            }
            "xfs" => {
                cmd.arg("-f");
            }
            _ => {}
        }
        cmd.arg(dev_path);
        cmd
    }
}

#[async_trait]
impl FilesystemOps for SystemFilesystemOps {
    async fn format(&self, dev_path: &str, fs_type: &str) -> Result<()> {
        info!(device = %dev_path, fs_type = %fs_type, "formatting device");

        let output = Self::mkfs_command(fs_type, dev_path)
            .output()
            .await
            .map_err(|e| Error::FormatFailed {
                device: dev_path.to_string(),
                fs_type: fs_type.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::FormatFailed {
                device: dev_path.to_string(),
                fs_type: fs_type.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn mount(&self, dev_path: &str, mount_point: &str) -> Result<()> {
        info!(device = %dev_path, mount_point = %mount_point, "mounting device");

        tokio::fs::create_dir_all(mount_point)
            .await
            .map_err(|e| Error::MountFailed {
                device: dev_path.to_string(),
                mount_point: mount_point.to_string(),
                reason: e.to_string(),
            })?;

        let output = Command::new("mount")
            .arg(dev_path)
            .arg(mount_point)
            .output()
            .await
            .map_err(|e| Error::MountFailed {
                device: dev_path.to_string(),
                mount_point: mount_point.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::MountFailed {
                device: dev_path.to_string(),
                mount_point: mount_point.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mkfs_command_flags() {
        let cmd = SystemFilesystemOps::mkfs_command("ext4", "/dev/sdb1");
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(args, ["-F", "/dev/sdb1"]);

        let cmd = SystemFilesystemOps::mkfs_command("xfs", "/dev/sdb1");
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(args, ["-f", "/dev/sdb1"]);

        let cmd = SystemFilesystemOps::mkfs_command("btrfs", "/dev/sdb1");
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(args, ["/dev/sdb1"]);
    }
}
