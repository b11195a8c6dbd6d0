mod bundle;
mod delta;
mod sink;
mod tarball;
