//! One function per subcommand; output goes to the given writer.

use std::io::Write;
use std::path::Path;

use urlfs::{
    DirectoryCapability, Error, FileCapability, Resource, ResourceCapability, Urlfs,
    COPY_CHUNK_SIZE,
};

use crate::{CliError, Command};

pub fn execute(fs: &Urlfs, command: Command, out: &mut impl Write) -> Result<(), CliError> {
    match command {
        Command::Cat { url } => cat(fs, &url, out),
        Command::Ls { url, long } => ls(fs, &url, long, out),
        Command::Cp { src, dest, force } => cp(fs, &src, &dest, force, out),
        Command::Rm { url, recursive } => rm(fs, &url, recursive),
        Command::Stat { url } => stat(fs, &url, out),
        Command::Touch { url } => touch(fs, &url),
        Command::Get { url, local, force } => get(fs, &url, &local, force, out),
        Command::Put { local, url, force } => put(fs, &local, &url, force),
    }
}

pub fn cat(fs: &Urlfs, url: &str, out: &mut impl Write) -> Result<(), CliError> {
    let mut file = fs.open_file(url)?;
    if !file.exists()? {
        return Err(Error::not_found(url).into());
    }
    loop {
        let chunk = file.read(Some(COPY_CHUNK_SIZE))?;
        out.write_all(&chunk)?;
        if chunk.len() < COPY_CHUNK_SIZE {
            break;
        }
    }
    out.flush()?;
    Ok(())
}

pub fn ls(fs: &Urlfs, url: &str, long: bool, out: &mut impl Write) -> Result<(), CliError> {
    match fs.resolve(url)? {
        Resource::Directory(dir) => {
            for name in dir.list()? {
                if long {
                    let child = dir.child(&name)?;
                    write_long(&child, &name, out)?;
                } else {
                    writeln!(out, "{}", name)?;
                }
            }
        }
        file @ Resource::File(_) => {
            if !file.exists()? {
                return Err(Error::not_found(url).into());
            }
            if long {
                write_long(&file, file.name(), out)?;
            } else {
                writeln!(out, "{}", file.name())?;
            }
        }
    }
    Ok(())
}

fn write_long(resource: &Resource, name: &str, out: &mut impl Write) -> Result<(), CliError> {
    let kind = if resource.is_directory() { 'd' } else { '-' };
    writeln!(
        out,
        "{} {:>12} {} {}",
        kind,
        resource.size()?,
        resource.mtime()?.format("%Y-%m-%d %H:%M"),
        name
    )?;
    Ok(())
}

pub fn cp(
    fs: &Urlfs,
    src: &str,
    dest: &str,
    force: bool,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let target = fs.copy(src, dest, force)?;
    log::info!("copied {} -> {}", src, target);
    writeln!(out, "{}", target)?;
    Ok(())
}

pub fn rm(fs: &Urlfs, url: &str, recursive: bool) -> Result<(), CliError> {
    let mut resource = fs.resolve(url)?;
    if resource.is_directory() && !recursive {
        return Err(CliError::IsDirectory {
            url: url.to_string(),
        });
    }
    if !resource.delete()? {
        return Err(Error::not_found(url).into());
    }
    log::info!("removed {}", resource.url());
    Ok(())
}

pub fn stat(fs: &Urlfs, url: &str, out: &mut impl Write) -> Result<(), CliError> {
    let resource = fs.resolve(url)?;
    if !resource.exists()? {
        return Err(Error::not_found(url).into());
    }
    let kind = if resource.is_directory() {
        "directory"
    } else {
        "file"
    };
    writeln!(out, "url:      {}", resource.url())?;
    writeln!(out, "kind:     {}", kind)?;
    writeln!(out, "size:     {}", resource.size()?)?;
    writeln!(out, "created:  {}", resource.ctime()?.to_rfc3339())?;
    writeln!(out, "modified: {}", resource.mtime()?.to_rfc3339())?;
    writeln!(out, "accessed: {}", resource.atime()?.to_rfc3339())?;
    Ok(())
}

pub fn touch(fs: &Urlfs, url: &str) -> Result<(), CliError> {
    let mut resource = fs.resolve(url)?;
    if resource.create()? {
        log::info!("created {}", resource.url());
    }
    Ok(())
}

pub fn get(
    fs: &Urlfs,
    url: &str,
    local: &Path,
    force: bool,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let written = fs.resolve(url)?.get(local, force)?;
    writeln!(out, "{}", written.display())?;
    Ok(())
}

pub fn put(fs: &Urlfs, local: &Path, url: &str, force: bool) -> Result<(), CliError> {
    let mut resource = fs.resolve(url)?;
    resource.put(local, force)?;
    log::info!("uploaded {} -> {}", local.display(), resource.url());
    Ok(())
}
